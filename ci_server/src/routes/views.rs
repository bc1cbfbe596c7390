//! HTML pages for the build history.

use std::fmt::Write;

use crate::models::{BuildRecord, VerdictState};

const STYLE: &str = "body{font-family:sans-serif;margin:2em}\
table{border-collapse:collapse}td,th{padding:.3em .8em;border-bottom:1px solid #ddd;text-align:left}\
.success{color:#1a7f37}.error{color:#9a6700}.failure{color:#cf222e}code{font-size:.9em}";

/// Page listing every build.
pub fn render_index(records: &[BuildRecord]) -> String {
    let mut body = String::from("<h1>Build history</h1>\n");
    if records.is_empty() {
        body.push_str("<p>No builds yet.</p>\n");
        return page("Build history", &body);
    }

    body.push_str("<table>\n<tr><th>Commit</th><th>Branch</th><th>Verdict</th><th>Time</th><th>Description</th></tr>\n");
    for record in records {
        let sha = escape(&record.commit_sha);
        let _ = writeln!(
            body,
            "<tr><td><a href=\"/builds/{sha}\"><code>{short}</code></a></td><td>{branch}</td>\
             <td class=\"{class}\">{verdict}</td><td>{time}</td><td>{desc}</td></tr>",
            short = escape(short_sha(&record.commit_sha)),
            branch = escape(record.branch.as_deref().unwrap_or("")),
            class = verdict_class(record.verdict),
            verdict = record.verdict,
            time = record.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            desc = escape(&record.description),
        );
    }
    body.push_str("</table>\n");
    page("Build history", &body)
}

/// Page for a single build.
pub fn render_build(record: &BuildRecord) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "<h1>Build <code>{}</code></h1>", escape(&record.commit_sha));
    body.push_str("<table>\n");
    let _ = writeln!(
        body,
        "<tr><th>Verdict</th><td class=\"{}\">{}</td></tr>",
        verdict_class(record.verdict),
        record.verdict
    );
    let _ = writeln!(
        body,
        "<tr><th>Time</th><td>{}</td></tr>",
        record.timestamp.to_rfc3339()
    );
    if let Some(branch) = &record.branch {
        let _ = writeln!(body, "<tr><th>Branch</th><td>{}</td></tr>", escape(branch));
    }
    if let Some(ms) = record.duration_ms {
        let _ = writeln!(body, "<tr><th>Duration</th><td>{:.1}s</td></tr>", ms as f64 / 1000.0);
    }
    let _ = writeln!(
        body,
        "<tr><th>Description</th><td>{}</td></tr>",
        escape(&record.description)
    );
    body.push_str("</table>\n<p><a href=\"/\">All builds</a></p>\n");
    page(&format!("Build {}", short_sha(&record.commit_sha)), &body)
}

pub fn render_not_found(sha: &str) -> String {
    let body = format!(
        "<h1>Unknown build</h1>\n<p>No build recorded for <code>{}</code>.</p>\n<p><a href=\"/\">All builds</a></p>\n",
        escape(sha)
    );
    page("Unknown build", &body)
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{}</title><style>{STYLE}</style></head>\n<body>\n{body}</body></html>\n",
        escape(title)
    )
}

fn verdict_class(verdict: VerdictState) -> &'static str {
    verdict.as_str()
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

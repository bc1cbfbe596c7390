//! ci.push_event — The parsed push notification that triggers one build.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::PayloadError;

const NULL_SHA: &str = "0000000000000000000000000000000000000000";

/// Abbreviated to full-length object ids, SHA-1 or SHA-256.
static COMMIT_SHA_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{7,64}$").unwrap());

/// `owner/name` as GitHub allows them.
static FULL_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$").unwrap());

/// An immutable push event, built once from the webhook payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushEvent {
    /// URL the repository can be cloned from.
    pub repository_url: String,
    /// `owner/name`, used to address the status API.
    pub repository: Option<String>,
    /// Full ref, e.g. `refs/heads/main`.
    pub git_ref: String,
    /// Branch name with the `refs/heads/` prefix removed.
    pub branch: String,
    /// Head commit of the push. Keys the build.
    pub commit_sha: String,
}

impl PushEvent {
    /// Extract a push event from a GitHub push payload.
    ///
    /// Returns `Ok(None)` for pushes that never produce a build: tag pushes and
    /// branch deletions.
    pub fn from_payload(payload: &serde_json::Value) -> Result<Option<Self>, PayloadError> {
        let repository_url = payload["repository"]["clone_url"]
            .as_str()
            .or_else(|| payload["repository"]["url"].as_str())
            .filter(|s| !s.is_empty())
            .ok_or(PayloadError::MissingField("repository.clone_url"))?;
        let git_ref = payload["ref"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or(PayloadError::MissingField("ref"))?;

        if payload["deleted"].as_bool().unwrap_or(false) {
            return Ok(None);
        }
        let branch = match git_ref.strip_prefix("refs/heads/") {
            Some(branch) if !branch.is_empty() => branch,
            Some(_) => return Err(PayloadError::MissingField("ref")),
            None if git_ref.starts_with("refs/") => return Ok(None),
            None => git_ref,
        };

        let commit_sha = payload["after"]
            .as_str()
            .filter(|s| !s.is_empty() && *s != NULL_SHA)
            .or_else(|| payload["head_commit"]["id"].as_str())
            .filter(|s| !s.is_empty())
            .ok_or(PayloadError::MissingField("after"))?;
        if !COMMIT_SHA_REGEX.is_match(commit_sha) {
            return Err(PayloadError::InvalidField {
                field: "after",
                value: commit_sha.to_string(),
            });
        }

        let repository = match payload["repository"]["full_name"].as_str() {
            None | Some("") => None,
            Some(name) if is_valid_full_name(name) => Some(name.to_string()),
            Some(name) => {
                return Err(PayloadError::InvalidField {
                    field: "repository.full_name",
                    value: name.to_string(),
                });
            }
        };

        Ok(Some(Self {
            repository_url: repository_url.to_string(),
            repository,
            git_ref: git_ref.to_string(),
            branch: branch.to_string(),
            commit_sha: commit_sha.to_string(),
        }))
    }

    /// Abbreviated SHA for log lines and directory names.
    pub fn short_sha(&self) -> &str {
        let end = self
            .commit_sha
            .char_indices()
            .nth(7)
            .map(|(i, _)| i)
            .unwrap_or(self.commit_sha.len());
        &self.commit_sha[..end]
    }
}

fn is_valid_full_name(name: &str) -> bool {
    FULL_NAME_REGEX.is_match(name) && !name.split('/').any(|part| part == "." || part == "..")
}

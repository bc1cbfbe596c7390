//! GitHub integration — commit status updates.

use async_trait::async_trait;

use crate::config::CiConfig;
use crate::error::ReportingError;
use crate::models::CommitState;

/// GitHub rejects commit status descriptions beyond this many characters.
pub const MAX_DESCRIPTION_CHARS: usize = 140;

#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// Publish `state` for `sha` in `repo` (`owner/name`).
    async fn report(
        &self,
        repo: Option<&str>,
        sha: &str,
        state: CommitState,
        description: &str,
    ) -> Result<(), ReportingError>;
}

/// Posts commit statuses to the GitHub REST API.
#[derive(Clone)]
pub struct GithubStatusReporter {
    client: reqwest::Client,
    token: String,
    api_url: String,
    context: String,
    dashboard_url: String,
}

impl GithubStatusReporter {
    pub fn new(
        token: impl Into<String>,
        api_url: impl Into<String>,
        context: impl Into<String>,
        dashboard_url: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
            api_url: api_url.into(),
            context: context.into(),
            dashboard_url: dashboard_url.into(),
        }
    }

    pub fn from_config(config: &CiConfig) -> Self {
        Self::new(
            &config.github_token,
            &config.github_api_url,
            &config.status_context,
            &config.dashboard_url,
        )
    }
}

#[async_trait]
impl StatusReporter for GithubStatusReporter {
    async fn report(
        &self,
        repo: Option<&str>,
        sha: &str,
        state: CommitState,
        description: &str,
    ) -> Result<(), ReportingError> {
        let repo = repo.ok_or(ReportingError::MissingRepository)?;

        let url = format!("{}/repos/{repo}/statuses/{sha}", self.api_url);
        let body = serde_json::json!({
            "state": state.as_str(),
            "description": truncate_description(description),
            "target_url": format!("{}/builds/{sha}", self.dashboard_url),
            "context": self.context,
        });

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "push-ci")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(ReportingError::Rejected { status, body: text });
        }

        tracing::debug!(repo, sha, state = state.as_str(), "Commit status posted");
        Ok(())
    }
}

fn truncate_description(text: &str) -> String {
    if text.chars().count() <= MAX_DESCRIPTION_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_DESCRIPTION_CHARS - 3).collect();
    out.push_str("...");
    out
}

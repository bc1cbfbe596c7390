//! CI server configuration — loaded once from environment variables.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Clone, Debug)]
pub struct CiConfig {
    /// GitHub access token for commit status updates.
    pub github_token: String,
    /// Base URL of the GitHub REST API.
    pub github_api_url: String,
    /// Context label shown next to the commit status.
    pub status_context: String,
    /// Public base URL of this server, used for status `target_url` links.
    pub dashboard_url: String,
    /// Parent directory for per-build working copies.
    pub workspace_dir: PathBuf,
    /// JSON file holding the build history.
    pub history_path: PathBuf,
    /// Directory names skipped by the syntax validator.
    pub excluded_dirs: BTreeSet<String>,
    /// Python 3 interpreter whose parser decides what is valid syntax.
    pub python: String,
    /// Upper bound on each syntax checker invocation.
    pub syntax_timeout: Duration,
    /// Shell command that runs the project's test suite.
    pub test_command: String,
    /// Exit code the test tool uses for "no tests collected".
    pub no_tests_exit_code: i32,
    /// Upper bound on a test run.
    pub test_timeout: Duration,
    /// Upper bound on each git clone/checkout.
    pub clone_timeout: Duration,
}

impl CiConfig {
    /// Read the configuration from the process environment.
    ///
    /// Fails when the GitHub token is absent: a server that cannot report
    /// statuses should not start.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let github_token = lookup("CI_GITHUB_TOKEN")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingToken)?;

        let github_api_url = lookup("CI_GITHUB_API_URL")
            .unwrap_or_else(|| "https://api.github.com".to_string())
            .trim_end_matches('/')
            .to_string();
        let status_context = lookup("CI_STATUS_CONTEXT").unwrap_or_else(|| "push-ci".to_string());
        let dashboard_url = lookup("CI_DASHBOARD_URL")
            .unwrap_or_else(|| "http://localhost:8080".to_string())
            .trim_end_matches('/')
            .to_string();
        let workspace_dir = lookup("CI_WORKSPACE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        let history_path = lookup("CI_HISTORY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("builds.json"));
        let excluded_dirs = parse_excluded_dirs(lookup("CI_EXCLUDED_DIRS").as_deref());
        let python = lookup("CI_PYTHON")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "python3".to_string());
        let syntax_timeout =
            Duration::from_secs(parse_number(&lookup, "CI_SYNTAX_TIMEOUT", 120)?);
        let test_command =
            lookup("CI_TEST_COMMAND").unwrap_or_else(|| "python3 -m pytest".to_string());
        let no_tests_exit_code = parse_number(&lookup, "CI_NO_TESTS_EXIT_CODE", 5)?;
        let test_timeout = Duration::from_secs(parse_number(&lookup, "CI_TEST_TIMEOUT", 300)?);
        let clone_timeout = Duration::from_secs(parse_number(&lookup, "CI_CLONE_TIMEOUT", 120)?);

        Ok(Self {
            github_token,
            github_api_url,
            status_context,
            dashboard_url,
            workspace_dir,
            history_path,
            excluded_dirs,
            python,
            syntax_timeout,
            test_command,
            no_tests_exit_code,
            test_timeout,
            clone_timeout,
        })
    }
}

fn parse_excluded_dirs(raw: Option<&str>) -> BTreeSet<String> {
    match raw {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        None => BTreeSet::from(["test".to_string()]),
    }
}

fn parse_number<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default),
    }
}

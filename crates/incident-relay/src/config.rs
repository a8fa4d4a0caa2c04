//! Configuration for the incident relay, read once from the environment.

use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

use crate::evidence::query::DEFAULT_RESOURCE_TYPE;
use crate::evidence::Budget;
use crate::github_client::GITHUB_API_URL;
use crate::log_store::{
    CloudLoggingConfig, TokenSource, DEFAULT_LOGGING_API_URL, DEFAULT_METADATA_URL,
};
use crate::report::DEFAULT_PAYLOAD_MAX_CHARS;
use crate::routing::RepoMapping;
use crate::webhooks::BasicCredentials;

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(anyhow!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

/// Incident relay configuration.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,
    /// Project the logs live in.
    pub project_id: String,
    /// Region to scope log queries to.
    pub region: Option<String>,
    /// Monitored resource type of the services.
    pub resource_type: String,
    /// Service → repository routing.
    pub repo_mapping: RepoMapping,
    /// GitHub token for reading pull requests and posting comments.
    pub github_token: String,
    /// GitHub API base URL.
    pub github_api_url: String,
    /// Cloud Logging API base URL.
    pub logging_api_url: String,
    /// Pre-issued logging API token; the metadata server is used otherwise.
    pub gcp_access_token: Option<String>,
    /// Metadata server base URL.
    pub metadata_url: String,
    /// Handle mentioned at the top of each comment.
    pub mention_handle: String,
    /// Basic credentials required on the webhook, if any.
    pub credentials: Option<BasicCredentials>,
    /// Half-width of the incident window, minutes.
    pub window_min: u32,
    /// Length of the pre-trigger tail, minutes.
    pub pre_min: u32,
    /// Line budget across all sections.
    pub max_lines: usize,
    /// Character budget for the rendered comment.
    pub max_chars: usize,
    /// Cap on the raw payload attachment.
    pub payload_max_chars: usize,
    /// Entries requested per category.
    pub log_page_size: u32,
    /// Scope container errors to the first anomaly's trace.
    pub trace_correlation: bool,
    /// Answer the webhook before publishing.
    pub ack_before_publish: bool,
    /// Outbound HTTP timeout, seconds.
    pub http_timeout_secs: u64,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let project_id = get("GCP_PROJECT")
            .or_else(|| get("GOOGLE_CLOUD_PROJECT"))
            .context("GCP_PROJECT (or GOOGLE_CLOUD_PROJECT) must be set")?;
        let github_token = get("GITHUB_TOKEN").context("GITHUB_TOKEN must be set")?;

        let repo_map_json = get("REPO_MAP_JSON").unwrap_or_else(|| "{}".to_string());
        let repo_mapping = RepoMapping::from_json(&repo_map_json, get("DEFAULT_REPO").as_deref())
            .map_err(anyhow::Error::msg)
            .context("Invalid REPO_MAP_JSON / DEFAULT_REPO")?;

        let user = get("WEBHOOK_USER");
        let pass = get("WEBHOOK_PASS");
        let credentials = if user.is_some() || pass.is_some() {
            Some(BasicCredentials {
                username: user.unwrap_or_default(),
                password: pass.unwrap_or_default(),
            })
        } else {
            None
        };

        Ok(Self {
            port: parse_or(&get, "PORT", 8080)?,
            project_id,
            region: get("REGION"),
            resource_type: get("RESOURCE_TYPE")
                .unwrap_or_else(|| DEFAULT_RESOURCE_TYPE.to_string()),
            repo_mapping,
            github_token,
            github_api_url: get("GITHUB_API_URL").unwrap_or_else(|| GITHUB_API_URL.to_string()),
            logging_api_url: get("LOGGING_API_URL")
                .unwrap_or_else(|| DEFAULT_LOGGING_API_URL.to_string()),
            gcp_access_token: get("GCP_ACCESS_TOKEN"),
            metadata_url: get("METADATA_URL").unwrap_or_else(|| DEFAULT_METADATA_URL.to_string()),
            mention_handle: get("CODEX_HANDLE").unwrap_or_else(|| "codex".to_string()),
            credentials,
            window_min: parse_or(&get, "WINDOW_MIN", 5)?,
            pre_min: parse_or(&get, "PRE_MIN", 3)?,
            max_lines: parse_or(&get, "MAX_LINES", 40)?,
            max_chars: parse_or(&get, "MAX_CHARS", 20_000)?,
            payload_max_chars: parse_or(&get, "PAYLOAD_MAX_CHARS", DEFAULT_PAYLOAD_MAX_CHARS)?,
            log_page_size: parse_or(&get, "LOG_PAGE_SIZE", 100)?,
            trace_correlation: parse_flag(&get, "TRACE_CORRELATION")?,
            ack_before_publish: parse_flag(&get, "ACK_BEFORE_PUBLISH")?,
            http_timeout_secs: parse_or(&get, "HTTP_TIMEOUT_SECS", 30)?,
            log_format: get("LOG_FORMAT")
                .map(|v| v.parse::<LogFormat>())
                .transpose()
                .context("Invalid LOG_FORMAT")?
                .unwrap_or_default(),
        })
    }

    /// Report size limits.
    #[must_use]
    pub fn budget(&self) -> Budget {
        Budget {
            max_lines: self.max_lines,
            max_chars: self.max_chars,
        }
    }

    /// Settings for the Cloud Logging client.
    #[must_use]
    pub fn logging_client_config(&self) -> CloudLoggingConfig {
        let token = match &self.gcp_access_token {
            Some(token) => TokenSource::Static(token.clone()),
            None => TokenSource::Metadata {
                base_url: self.metadata_url.clone(),
            },
        };
        CloudLoggingConfig {
            api_url: self.logging_api_url.clone(),
            project_id: self.project_id.clone(),
            page_size: self.log_page_size,
            timeout_secs: self.http_timeout_secs,
            token,
        }
    }
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow!("{key}={raw:?} is not a valid number: {e}")),
    }
}

fn parse_flag<G>(get: &G, key: &str) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("false" | "0" | "no" | "off") => Ok(false),
        Some("true" | "1" | "yes" | "on") => Ok(true),
        Some(other) => Err(anyhow!("{key}={other:?} is not a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [("GCP_PROJECT", "proj"), ("GITHUB_TOKEN", "ghp_x")];

    #[test]
    fn test_defaults() {
        let config = load(&REQUIRED).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.project_id, "proj");
        assert_eq!(config.resource_type, "cloud_run_revision");
        assert_eq!(config.window_min, 5);
        assert_eq!(config.pre_min, 3);
        assert_eq!(config.max_lines, 40);
        assert_eq!(config.max_chars, 20_000);
        assert_eq!(config.payload_max_chars, 6000);
        assert_eq!(config.log_page_size, 100);
        assert_eq!(config.mention_handle, "codex");
        assert_eq!(config.github_api_url, "https://api.github.com");
        assert!(config.repo_mapping.is_empty());
        assert!(config.credentials.is_none());
        assert!(!config.trace_correlation);
        assert!(!config.ack_before_publish);
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(matches!(
            config.logging_client_config().token,
            TokenSource::Metadata { .. }
        ));
    }

    #[test]
    fn test_required_variables() {
        assert!(load(&[("GITHUB_TOKEN", "t")]).is_err());
        assert!(load(&[("GCP_PROJECT", "p")]).is_err());

        let config = load(&[("GOOGLE_CLOUD_PROJECT", "alt"), ("GITHUB_TOKEN", "t")]).unwrap();
        assert_eq!(config.project_id, "alt");
    }

    #[test]
    fn test_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("REPO_MAP_JSON", r#"{"svc-a":"OWNER/REPO_A"}"#),
            ("DEFAULT_REPO", "OWNER/DEFAULT"),
            ("WINDOW_MIN", "10"),
            ("MAX_CHARS", "5000"),
            ("TRACE_CORRELATION", "true"),
            ("ACK_BEFORE_PUBLISH", "1"),
            ("GCP_ACCESS_TOKEN", "ya29.token"),
            ("WEBHOOK_USER", "alerts"),
            ("LOG_FORMAT", "json"),
        ]);
        let config = load(&vars).unwrap();

        assert_eq!(config.repo_mapping.len(), 1);
        assert_eq!(config.repo_mapping.fallback().unwrap().to_string(), "OWNER/DEFAULT");
        assert_eq!(config.window_min, 10);
        assert_eq!(config.budget().max_chars, 5000);
        assert!(config.trace_correlation);
        assert!(config.ack_before_publish);
        assert_eq!(
            config.logging_client_config().token,
            TokenSource::Static("ya29.token".to_string())
        );
        let creds = config.credentials.unwrap();
        assert_eq!(creds.username, "alerts");
        assert_eq!(creds.password, "");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_values_fail_startup() {
        for (key, value) in [
            ("WINDOW_MIN", "five"),
            ("MAX_LINES", "-1"),
            ("PORT", "70000"),
            ("TRACE_CORRELATION", "maybe"),
            ("LOG_FORMAT", "xml"),
            ("REPO_MAP_JSON", r#"{"svc":"not-a-slug"}"#),
            ("DEFAULT_REPO", "nope"),
        ] {
            let mut vars = REQUIRED.to_vec();
            vars.push((key, value));
            assert!(load(&vars).is_err(), "{key}={value}");
        }
    }
}

//! Google Cloud Logging client for fetching incident evidence.
//!
//! Queries the `entries:list` REST endpoint and normalizes each entry into a
//! [`LogLine`]. Only the first page is read: the store is asked for the newest
//! `page_size` entries of a category, which the collector then orders oldest
//! first.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use incident_relay::log_store::{CloudLoggingClient, CloudLoggingConfig, LogStore};
//!
//! let client = CloudLoggingClient::new(CloudLoggingConfig::new("my-project"))?;
//! let lines = client.query(&filter).await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ClientError;
use crate::evidence::{LogFilter, LogLine};
use crate::report::truncate_chars;

/// Default Cloud Logging API base URL.
pub const DEFAULT_LOGGING_API_URL: &str = "https://logging.googleapis.com";

/// Default GCE metadata server base URL.
pub const DEFAULT_METADATA_URL: &str = "http://metadata.google.internal";

/// Longest log body kept per entry, in characters.
pub const MAX_BODY_CHARS: usize = 2000;

/// Read-only log query interface.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Run one filter and return its entries in store order.
    async fn query(&self, filter: &LogFilter) -> Result<Vec<LogLine>, ClientError>;
}

/// Where the bearer token for the logging API comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// A pre-issued access token
    Static(String),
    /// The instance's default service account, via the metadata server
    Metadata { base_url: String },
}

/// Configuration for the Cloud Logging client.
#[derive(Debug, Clone)]
pub struct CloudLoggingConfig {
    /// Base URL for the logging API
    pub api_url: String,
    /// Project the entries live in
    pub project_id: String,
    /// Entries requested per category
    pub page_size: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    pub token: TokenSource,
}

impl CloudLoggingConfig {
    /// Defaults for a project, using the metadata server for tokens.
    #[must_use]
    pub fn new(project_id: &str) -> Self {
        Self {
            api_url: DEFAULT_LOGGING_API_URL.to_string(),
            project_id: project_id.to_string(),
            page_size: 100,
            timeout_secs: 30,
            token: TokenSource::Metadata {
                base_url: DEFAULT_METADATA_URL.to_string(),
            },
        }
    }
}

/// Client for the Cloud Logging v2 API.
#[derive(Debug, Clone)]
pub struct CloudLoggingClient {
    config: CloudLoggingConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListEntriesRequest<'a> {
    resource_names: Vec<String>,
    filter: &'a str,
    order_by: &'static str,
    page_size: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEntriesResponse {
    #[serde(default)]
    entries: Vec<LogEntryRecord>,
}

/// A Cloud Logging `LogEntry`, reduced to the fields the report uses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntryRecord {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub receive_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub resource: Option<MonitoredResource>,
    #[serde(default)]
    pub http_request: Option<HttpRequestRecord>,
    #[serde(default)]
    pub trace: Option<String>,
    #[serde(default)]
    pub text_payload: Option<String>,
    #[serde(default)]
    pub json_payload: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitoredResource {
    #[serde(default)]
    pub labels: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestRecord {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub request_method: Option<String>,
    #[serde(default)]
    pub request_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

impl LogEntryRecord {
    /// Normalize into a [`LogLine`].
    ///
    /// Entries carrying neither a timestamp nor a receive timestamp cannot be
    /// ordered and are skipped.
    #[must_use]
    pub fn into_line(self) -> Option<LogLine> {
        let timestamp = self.timestamp.or(self.receive_timestamp)?;
        let body = match (self.text_payload, self.json_payload) {
            (Some(text), _) => text,
            (None, Some(json)) => json_body(&json),
            (None, None) => String::new(),
        };
        let http = self.http_request.unwrap_or_default();
        Some(LogLine {
            timestamp,
            severity: self.severity.unwrap_or_else(|| "DEFAULT".to_string()),
            service: self
                .resource
                .and_then(|r| r.labels.get("service_name").cloned()),
            http_status: http.status,
            method: http.request_method.filter(|m| !m.is_empty()),
            url: http.request_url.filter(|u| !u.is_empty()),
            trace_id: self.trace.filter(|t| !t.is_empty()),
            body: truncate_chars(&body, MAX_BODY_CHARS).to_string(),
        })
    }
}

/// Body text of a structured payload: its `message`/`msg`, else compact JSON.
fn json_body(payload: &Value) -> String {
    ["message", "msg"]
        .iter()
        .find_map(|key| payload.get(key).and_then(Value::as_str))
        .map_or_else(|| payload.to_string(), ToString::to_string)
}

impl CloudLoggingClient {
    /// Create a new client with the given configuration.
    pub fn new(config: CloudLoggingConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    async fn access_token(&self) -> Result<String, ClientError> {
        match &self.config.token {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Metadata { base_url } => {
                let url = format!(
                    "{}/computeMetadata/v1/instance/service-accounts/default/token",
                    base_url.trim_end_matches('/')
                );
                let response = self
                    .client
                    .get(&url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| ClientError::Token(e.to_string()))?;

                if !response.status().is_success() {
                    return Err(ClientError::Token(format!(
                        "metadata server returned {}",
                        response.status()
                    )));
                }

                let token: MetadataToken = response
                    .json()
                    .await
                    .map_err(|e| ClientError::Token(e.to_string()))?;
                Ok(token.access_token)
            }
        }
    }
}

#[async_trait]
impl LogStore for CloudLoggingClient {
    async fn query(&self, filter: &LogFilter) -> Result<Vec<LogLine>, ClientError> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/v2/entries:list",
            self.config.api_url.trim_end_matches('/')
        );

        debug!(
            category = %filter.category,
            start = %filter.window.start,
            end = %filter.window.end,
            "Querying Cloud Logging"
        );

        let request = ListEntriesRequest {
            resource_names: vec![format!("projects/{}", self.config.project_id)],
            filter: &filter.expression,
            order_by: "timestamp desc",
            page_size: self.config.page_size,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }

        let bytes = response.bytes().await?;
        let parsed: ListEntriesResponse = serde_json::from_slice(&bytes)?;
        let lines: Vec<LogLine> = parsed
            .entries
            .into_iter()
            .filter_map(LogEntryRecord::into_line)
            .collect();

        debug!(
            category = %filter.category,
            entries = lines.len(),
            "Retrieved log entries"
        );
        Ok(lines)
    }
}

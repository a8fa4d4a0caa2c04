//! Error types for the incident relay.

use axum::http::StatusCode;
use thiserror::Error;

use crate::evidence::LogCategory;

/// Errors returned by the HTTP collaborators (log store, GitHub).
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote API answered with a non-success status
    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// No access token could be obtained
    #[error("Access token unavailable: {0}")]
    Token(String),

    /// Response body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors raised while turning an alert into a published report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Payload is not JSON, or lacks an incident time or affected services
    #[error("Malformed alert: {0}")]
    MalformedAlert(String),

    /// Basic credentials missing or wrong
    #[error("Authentication failed")]
    AuthenticationFailure,

    /// A single log category could not be queried. Non-fatal.
    #[error("Log query for {category} failed: {source}")]
    LogQueryFailure {
        category: LogCategory,
        #[source]
        source: ClientError,
    },

    /// No service has a mapping and no fallback repository is configured
    #[error("No repository mapping matched services [{}] and no DEFAULT_REPO is set", services.join(", "))]
    UnresolvedRepository { services: Vec<String> },

    /// The target repository has never had a pull request
    #[error("No pull requests found in {repository}; open one so comments have a target")]
    NoPullRequestHistory { repository: String },

    /// Listing pull requests failed
    #[error("Failed to look up pull requests: {0}")]
    PullRequestLookup(#[source] ClientError),

    /// GitHub rejected the comment
    #[error("Failed to publish comment: {0}")]
    PublishFailure(#[source] ClientError),
}

impl ReportError {
    /// HTTP status the webhook answers with for this error.
    ///
    /// Permanent targeting failures answer 200 so the alert channel does not
    /// re-deliver a case that can never succeed.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedAlert(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationFailure => StatusCode::UNAUTHORIZED,
            Self::UnresolvedRepository { .. }
            | Self::NoPullRequestHistory { .. }
            | Self::LogQueryFailure { .. } => StatusCode::OK,
            Self::PullRequestLookup(_) | Self::PublishFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short machine-readable label used in webhook responses.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MalformedAlert(_) => "malformed",
            Self::AuthenticationFailure => "unauthorized",
            Self::LogQueryFailure { .. } => "degraded",
            Self::UnresolvedRepository { .. } => "unresolved",
            Self::NoPullRequestHistory { .. } => "no_pull_requests",
            Self::PullRequestLookup(_) | Self::PublishFailure(_) => "error",
        }
    }
}

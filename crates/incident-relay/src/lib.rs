//! Alert-to-pull-request incident relay.
//!
//! This crate provides:
//! - Webhook payload parsing and Basic credential verification
//! - Cloud Logging client and per-category evidence collection
//! - Budgeted Markdown report rendering
//! - Service to repository routing
//! - GitHub client for locating the latest pull request and commenting on it
//! - HTTP server for webhook handling (standalone service)

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Most async API methods can fail

pub mod config;
pub mod error;
pub mod evidence;
pub mod github_client;
pub mod log_store;
pub mod pipeline;
pub mod report;
pub mod routing;
pub mod server;
pub mod webhooks;

pub use config::Config;
pub use error::{ClientError, ReportError};
pub use github_client::{GitHubClient, PullRequestApi};
pub use log_store::{CloudLoggingClient, LogStore};
pub use pipeline::{IncidentPipeline, IncidentReport, PipelineSettings};
pub use routing::{RepoMapping, RepoSlug};
pub use webhooks::{verify_basic_auth, AlertEvent, BasicCredentials};

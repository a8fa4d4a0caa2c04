//! Cloud Logging filter construction for the three evidence categories.
//!
//! Everything here is pure: the filter is fully determined by its inputs.

use std::fmt::Write as _;

use super::window::{IncidentWindows, TimeWindow};
use super::LogCategory;

/// Resource type Cloud Run revisions log under.
pub const DEFAULT_RESOURCE_TYPE: &str = "cloud_run_revision";

/// Success statuses that are not worth reporting.
const EXPECTED_SUCCESS: std::ops::RangeInclusive<u16> = 200..=206;

/// Redirects plus 404, which are routine for public services.
const EXPECTED_OTHER: [u16; 7] = [301, 302, 303, 304, 307, 308, 404];

const REQUEST_LOG: &str = r#"logName=~"projects/.*/logs/run.googleapis.com%2Frequests""#;
const STDERR_LOG: &str = r#"logName=~"projects/.*/logs/run.googleapis.com%2Fstderr""#;

/// Where the queries are scoped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryScope {
    pub resource_type: String,
    pub region: Option<String>,
    pub services: Vec<String>,
}

impl QueryScope {
    #[must_use]
    pub fn new(resource_type: &str, region: Option<&str>, services: &[String]) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            region: region.map(ToString::to_string),
            services: services.to_vec(),
        }
    }
}

/// A filter expression together with the window it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub category: LogCategory,
    pub expression: String,
    pub window: TimeWindow,
}

/// Whether an HTTP status belongs in the anomalies section.
#[must_use]
pub fn is_anomalous_status(status: u16) -> bool {
    !(EXPECTED_SUCCESS.contains(&status) || EXPECTED_OTHER.contains(&status))
}

/// Build the filter for one category.
///
/// `trace` only affects [`LogCategory::ContainerErrors`], narrowing it to the
/// entries of a single request.
#[must_use]
pub fn build_filter(
    category: LogCategory,
    scope: &QueryScope,
    windows: &IncidentWindows,
    trace: Option<&str>,
) -> LogFilter {
    let window = match category {
        LogCategory::Tail => windows.tail,
        LogCategory::Anomalies | LogCategory::ContainerErrors => windows.incident,
    };

    let mut clauses = scope_clauses(scope);
    match category {
        LogCategory::Tail => {
            clauses.push(format!("(severity>=ERROR OR {STDERR_LOG})"));
        }
        LogCategory::Anomalies => {
            clauses.push(REQUEST_LOG.to_string());
            clauses.push(r#"NOT httpRequest.userAgent:"GoogleHC""#.to_string());
            clauses.push(r#"NOT httpRequest.requestUrl:"/health""#.to_string());
            clauses.push(anomalous_status_clause());
        }
        LogCategory::ContainerErrors => {
            clauses.push(
                r#"(severity>=ERROR OR textPayload:("Traceback" OR "Exception" OR "CRITICAL" OR "panic:") OR jsonPayload.message:("error" OR "exception"))"#
                    .to_string(),
            );
            if let Some(trace) = trace {
                clauses.push(format!(r#"trace="{}""#, escape(trace)));
            }
        }
    }
    clauses.push(format!(
        r#"timestamp>="{}" AND timestamp<="{}""#,
        window.start_rfc3339(),
        window.end_rfc3339()
    ));

    LogFilter {
        category,
        expression: clauses.join("\n"),
        window,
    }
}

fn scope_clauses(scope: &QueryScope) -> Vec<String> {
    let mut clauses = vec![format!(
        r#"resource.type="{}""#,
        escape(&scope.resource_type)
    )];
    if let Some(region) = &scope.region {
        clauses.push(format!(r#"resource.labels.location="{}""#, escape(region)));
    }
    if !scope.services.is_empty() {
        let services = scope
            .services
            .iter()
            .map(|s| format!(r#"resource.labels.service_name="{}""#, escape(s)))
            .collect::<Vec<_>>()
            .join(" OR ");
        clauses.push(format!("({services})"));
    }
    clauses
}

/// Status predicate matching [`is_anomalous_status`].
fn anomalous_status_clause() -> String {
    let mut not_expected = String::from("httpRequest.status>=300");
    for code in EXPECTED_OTHER {
        let _ = write!(not_expected, " AND httpRequest.status!={code}");
    }
    format!(
        "(httpRequest.status<{low} OR (httpRequest.status>{high} AND httpRequest.status<300) OR ({not_expected}))",
        low = EXPECTED_SUCCESS.start(),
        high = EXPECTED_SUCCESS.end(),
    )
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

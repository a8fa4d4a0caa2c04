//! Log evidence assembly: windows, queries, collection and budgeting.
//!
//! The three categories are always handled in the same priority order
//! ([`LogCategory::ALL`]): pre-trigger tail, request anomalies, container
//! errors. Sections are built once by the collector and may only shrink
//! afterwards.

pub mod budget;
pub mod collector;
pub mod query;
pub mod window;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

pub use budget::{fit_to_budget, Budget};
pub use collector::EvidenceCollector;
pub use query::{build_filter, is_anomalous_status, LogFilter, QueryScope};
pub use window::{IncidentWindows, TimeWindow};

/// Evidence category, in descending report priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    /// stderr / error output immediately before the trigger
    Tail,
    /// HTTP requests with unexpected statuses
    Anomalies,
    /// Elevated severity or error markers from the containers
    ContainerErrors,
}

impl LogCategory {
    /// All categories in priority order.
    pub const ALL: [Self; 3] = [Self::Tail, Self::Anomalies, Self::ContainerErrors];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tail => "tail",
            Self::Anomalies => "anomalies",
            Self::ContainerErrors => "container_errors",
        }
    }

    /// Heading used in the rendered report.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Tail => "Pre-trigger tail (stderr / errors)",
            Self::Anomalies => "Request anomalies",
            Self::ContainerErrors => "Container errors",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub severity: String,
    pub service: Option<String>,
    pub http_status: Option<u16>,
    pub method: Option<String>,
    pub url: Option<String>,
    pub trace_id: Option<String>,
    /// Free text, possibly multi-line
    pub body: String,
}

/// One category's worth of evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSection {
    pub category: LogCategory,
    pub lines: Vec<LogLine>,
    /// Set once any line has been dropped by the budget
    pub truncated: bool,
    pub dropped_count: usize,
    /// Query error message when the category could not be fetched
    pub failure: Option<String>,
}

impl LogSection {
    /// Build a section, ordering lines by timestamp.
    ///
    /// The sort is stable so lines sharing a timestamp keep the order the
    /// store returned them in.
    #[must_use]
    pub fn new(category: LogCategory, mut lines: Vec<LogLine>) -> Self {
        lines.sort_by_key(|line| line.timestamp);
        Self {
            category,
            lines,
            truncated: false,
            dropped_count: 0,
            failure: None,
        }
    }

    /// Empty placeholder for a category whose query failed.
    #[must_use]
    pub fn failed(category: LogCategory, reason: impl Into<String>) -> Self {
        Self {
            category,
            lines: Vec::new(),
            truncated: false,
            dropped_count: 0,
            failure: Some(reason.into()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Keep at most `keep` lines (oldest first), recording what was dropped.
    pub fn shrink_to(&mut self, keep: usize) {
        if keep >= self.lines.len() {
            return;
        }
        let dropped = self.lines.len() - keep;
        self.lines.truncate(keep);
        self.truncated = true;
        self.dropped_count += dropped;
    }
}

/// The three sections of a report, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evidence {
    pub tail: LogSection,
    pub anomalies: LogSection,
    pub container_errors: LogSection,
}

impl Evidence {
    /// Evidence with every section empty.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            tail: LogSection::new(LogCategory::Tail, Vec::new()),
            anomalies: LogSection::new(LogCategory::Anomalies, Vec::new()),
            container_errors: LogSection::new(LogCategory::ContainerErrors, Vec::new()),
        }
    }

    /// Sections in priority order.
    #[must_use]
    pub fn sections(&self) -> [&LogSection; 3] {
        [&self.tail, &self.anomalies, &self.container_errors]
    }

    /// Mutable sections in priority order.
    pub fn sections_mut(&mut self) -> [&mut LogSection; 3] {
        [
            &mut self.tail,
            &mut self.anomalies,
            &mut self.container_errors,
        ]
    }

    /// Total lines across all sections.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.sections().iter().map(|s| s.lines.len()).sum()
    }

    /// Categories whose query failed.
    #[must_use]
    pub fn failed_categories(&self) -> Vec<LogCategory> {
        self.sections()
            .iter()
            .filter(|s| s.failure.is_some())
            .map(|s| s.category)
            .collect()
    }
}

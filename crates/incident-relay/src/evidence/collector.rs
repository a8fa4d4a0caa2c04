//! Fan-out of the three category queries against the log store.

use std::sync::Arc;

use tracing::{debug, warn};

use super::query::{build_filter, QueryScope};
use super::window::IncidentWindows;
use super::{Evidence, LogCategory, LogSection};
use crate::error::ReportError;
use crate::log_store::LogStore;

/// Issues one query per category and normalizes the results into sections.
pub struct EvidenceCollector {
    store: Arc<dyn LogStore>,
    scope: QueryScope,
    correlate_traces: bool,
}

impl EvidenceCollector {
    #[must_use]
    pub fn new(store: Arc<dyn LogStore>, scope: QueryScope, correlate_traces: bool) -> Self {
        Self {
            store,
            scope,
            correlate_traces,
        }
    }

    /// Collect all three sections.
    ///
    /// Never fails: a category whose query errors comes back empty with its
    /// `failure` set, and the other categories are still collected.
    pub async fn collect(&self, windows: &IncidentWindows) -> Evidence {
        let (tail, anomalies, container_errors) = if self.correlate_traces {
            // Container errors depend on the first anomaly's trace, so only
            // the tail can run alongside that chain.
            let chain = async {
                let anomalies = self.fetch(LogCategory::Anomalies, windows, None).await;
                let trace = anomalies.lines.iter().find_map(|l| l.trace_id.clone());
                if let Some(trace) = &trace {
                    debug!(trace = %trace, "Correlating container errors by trace");
                }
                let errors = self
                    .fetch(LogCategory::ContainerErrors, windows, trace.as_deref())
                    .await;
                (anomalies, errors)
            };
            let (tail, (anomalies, errors)) =
                tokio::join!(self.fetch(LogCategory::Tail, windows, None), chain);
            (tail, anomalies, errors)
        } else {
            tokio::join!(
                self.fetch(LogCategory::Tail, windows, None),
                self.fetch(LogCategory::Anomalies, windows, None),
                self.fetch(LogCategory::ContainerErrors, windows, None),
            )
        };

        Evidence {
            tail,
            anomalies,
            container_errors,
        }
    }

    async fn fetch(
        &self,
        category: LogCategory,
        windows: &IncidentWindows,
        trace: Option<&str>,
    ) -> LogSection {
        let filter = build_filter(category, &self.scope, windows, trace);
        match self.store.query(&filter).await {
            Ok(lines) => {
                debug!(category = %category, lines = lines.len(), "Collected section");
                LogSection::new(category, lines)
            }
            Err(source) => {
                let reason = source.to_string();
                let err = ReportError::LogQueryFailure { category, source };
                warn!(category = %category, error = %err, "Section left empty");
                LogSection::failed(category, reason)
            }
        }
    }
}

//! End-to-end handling of one alert delivery.
//!
//! compute windows → resolve repository → collect evidence → fit to budget →
//! locate pull request → publish comment.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::ReportError;
use crate::evidence::{
    fit_to_budget, Budget, Evidence, EvidenceCollector, IncidentWindows, LogCategory, QueryScope,
};
use crate::github_client::PullRequestApi;
use crate::log_store::LogStore;
use crate::report::ReportComposer;
use crate::routing::{RepoMapping, RepoSlug};
use crate::webhooks::AlertEvent;

/// Knobs the pipeline needs, separated from server and client settings.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub window_min: u32,
    pub pre_min: u32,
    pub budget: Budget,
    pub resource_type: String,
    pub region: Option<String>,
    pub trace_correlation: bool,
    pub mention_handle: String,
    pub payload_max_chars: usize,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            window_min: config.window_min,
            pre_min: config.pre_min,
            budget: config.budget(),
            resource_type: config.resource_type.clone(),
            region: config.region.clone(),
            trace_correlation: config.trace_correlation,
            mention_handle: config.mention_handle.clone(),
            payload_max_chars: config.payload_max_chars,
        }
    }
}

/// A report that has been composed but not yet published.
#[derive(Debug, Clone)]
pub struct DraftReport {
    pub repository: RepoSlug,
    pub windows: IncidentWindows,
    pub evidence: Evidence,
    pub text: String,
}

/// Outcome of a published report.
#[derive(Debug, Clone)]
pub struct IncidentReport {
    pub repository: RepoSlug,
    pub pull_request: u64,
    pub comment_url: Option<String>,
    /// Categories whose log query failed
    pub degraded_sections: Vec<LogCategory>,
    pub text: String,
}

/// Turns alerts into published comments.
pub struct IncidentPipeline {
    settings: PipelineSettings,
    mapping: RepoMapping,
    log_store: Arc<dyn LogStore>,
    pull_requests: Arc<dyn PullRequestApi>,
    composer: ReportComposer,
}

impl IncidentPipeline {
    #[must_use]
    pub fn new(
        settings: PipelineSettings,
        mapping: RepoMapping,
        log_store: Arc<dyn LogStore>,
        pull_requests: Arc<dyn PullRequestApi>,
    ) -> Self {
        let composer = ReportComposer::new(&settings.mention_handle, settings.payload_max_chars);
        Self {
            settings,
            mapping,
            log_store,
            pull_requests,
            composer,
        }
    }

    /// Incident and tail windows for an alert.
    ///
    /// An incident time whose windows fall outside the representable range is
    /// rejected as malformed.
    pub fn windows(&self, alert: &AlertEvent) -> Result<IncidentWindows, ReportError> {
        IncidentWindows::compute(
            alert.incident_time,
            self.settings.window_min,
            self.settings.pre_min,
        )
        .ok_or_else(|| {
            ReportError::MalformedAlert(format!(
                "incident time {} is out of range for the configured windows",
                alert.incident_time
            ))
        })
    }

    /// Resolve the target and compose the comment without touching GitHub.
    pub async fn draft(&self, alert: &AlertEvent) -> Result<DraftReport, ReportError> {
        let windows = self.windows(alert)?;
        let repository = self.mapping.resolve(&alert.affected_services)?;

        let scope = QueryScope::new(
            &self.settings.resource_type,
            self.settings.region.as_deref(),
            &alert.affected_services,
        );
        let collector = EvidenceCollector::new(
            Arc::clone(&self.log_store),
            scope,
            self.settings.trace_correlation,
        );
        let evidence = collector.collect(&windows).await;

        let (evidence, text) = fit_to_budget(evidence, self.settings.budget, |ev| {
            self.composer.render(alert, &windows, ev)
        });

        Ok(DraftReport {
            repository,
            windows,
            evidence,
            text,
        })
    }

    /// Compose and publish the report for one alert.
    pub async fn run(&self, alert: &AlertEvent) -> Result<IncidentReport, ReportError> {
        let draft = self.draft(alert).await?;
        let repository = draft.repository;

        let pull_request = self
            .pull_requests
            .latest_pull_request(&repository)
            .await
            .map_err(ReportError::PullRequestLookup)?
            .ok_or_else(|| ReportError::NoPullRequestHistory {
                repository: repository.to_string(),
            })?;

        let comment = self
            .pull_requests
            .create_comment(&repository, pull_request.number, &draft.text)
            .await
            .map_err(ReportError::PublishFailure)?;

        let degraded_sections = draft.evidence.failed_categories();
        if !degraded_sections.is_empty() {
            warn!(
                repo = %repository,
                sections = ?degraded_sections,
                "Report published with degraded sections"
            );
        }
        info!(
            repo = %repository,
            pr = pull_request.number,
            lines = draft.evidence.line_count(),
            chars = draft.text.chars().count(),
            "Incident report published"
        );

        Ok(IncidentReport {
            repository,
            pull_request: pull_request.number,
            comment_url: comment.html_url,
            degraded_sections,
            text: draft.text,
        })
    }
}

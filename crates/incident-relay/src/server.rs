//! HTTP server for alert webhooks.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::error::ReportError;
use crate::pipeline::IncidentPipeline;
use crate::webhooks::{verify_basic_auth, AlertEvent, BasicCredentials};

/// Challenge sent with 401 responses.
const WWW_AUTHENTICATE: &str = "Basic realm=\"incident-relay\"";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Alert processing pipeline.
    pub pipeline: Arc<IncidentPipeline>,
    /// Credentials required on `/alert`; `None` leaves the endpoint open.
    pub credentials: Option<BasicCredentials>,
    /// Answer before publishing and finish the work in the background.
    pub ack_before_publish: bool,
}

/// Build the HTTP router for the relay.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/alert", post(alert_handler))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Handle one alert delivery.
///
/// Credentials are checked before the body is even parsed, so a rejected
/// request never reaches the log store or GitHub.
pub async fn alert_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(expected) = &state.credentials {
        let provided = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if !verify_basic_auth(provided, expected) {
            warn!("Rejected alert with missing or invalid credentials");
            return error_response(&ReportError::AuthenticationFailure);
        }
    }

    let alert = match AlertEvent::parse(&body).and_then(|alert| {
        state.pipeline.windows(&alert)?;
        Ok(alert)
    }) {
        Ok(alert) => alert,
        Err(e) => {
            warn!(error = %e, "Rejected malformed alert");
            return error_response(&e);
        }
    };

    info!(
        condition = %alert.condition,
        services = ?alert.affected_services,
        incident_time = %alert.incident_time,
        "Received alert"
    );

    if state.ack_before_publish {
        let pipeline = Arc::clone(&state.pipeline);
        tokio::spawn(async move {
            match pipeline.run(&alert).await {
                Ok(report) => debug!(
                    repo = %report.repository,
                    pr = report.pull_request,
                    "Background report finished"
                ),
                Err(e) => log_failure(&e),
            }
        });
        return (StatusCode::OK, Json(json!({ "status": "accepted" }))).into_response();
    }

    match state.pipeline.run(&alert).await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({
                "status": "posted",
                "repo": report.repository,
                "pr": report.pull_request,
                "comment_url": report.comment_url,
                "degraded_sections": report.degraded_sections,
            })),
        )
            .into_response(),
        Err(e) => {
            log_failure(&e);
            error_response(&e)
        }
    }
}

fn log_failure(err: &ReportError) {
    match err {
        ReportError::UnresolvedRepository { .. } | ReportError::NoPullRequestHistory { .. } => {
            warn!(error = %err, "Alert not reported");
        }
        _ => error!(error = %err, "Failed to report alert"),
    }
}

fn error_response(err: &ReportError) -> Response {
    let status = err.status_code();
    let body = Json(json!({
        "status": err.kind(),
        "error": err.to_string(),
    }));
    if status == StatusCode::UNAUTHORIZED {
        let mut response = (status, body).into_response();
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static(WWW_AUTHENTICATE),
        );
        return response;
    }
    (status, body).into_response()
}

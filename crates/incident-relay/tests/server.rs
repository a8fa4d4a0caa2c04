//! Router tests: the webhook end to end against mocked Cloud Logging and GitHub.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::Engine as _;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use incident_relay::evidence::Budget;
use incident_relay::log_store::{CloudLoggingClient, CloudLoggingConfig, TokenSource};
use incident_relay::server::{build_router, AppState};
use incident_relay::{
    BasicCredentials, GitHubClient, IncidentPipeline, PipelineSettings, RepoMapping,
};

const ALERT: &str = r#"{
  "incident": {
    "started_at": 1710763500,
    "condition_name": "5xx ratio > 1%",
    "resource": {"type": "cloud_run_revision", "labels": {"service_name": "svc-a"}}
  }
}"#;

fn settings() -> PipelineSettings {
    PipelineSettings {
        window_min: 5,
        pre_min: 3,
        budget: Budget {
            max_lines: 40,
            max_chars: 20_000,
        },
        resource_type: "cloud_run_revision".into(),
        region: None,
        trace_correlation: false,
        mention_handle: "codex".into(),
        payload_max_chars: 6000,
    }
}

fn app_state(server: &MockServer, credentials: Option<BasicCredentials>) -> AppState {
    let logs = CloudLoggingClient::new(CloudLoggingConfig {
        api_url: server.uri(),
        project_id: "proj".into(),
        page_size: 100,
        timeout_secs: 5,
        token: TokenSource::Static("ya29.test".into()),
    })
    .unwrap();
    let github = GitHubClient::new("ghp_test", &server.uri(), 5).unwrap();
    let mapping = RepoMapping::from_json(r#"{"svc-a":"OWNER/REPO_A"}"#, None).unwrap();

    AppState {
        pipeline: Arc::new(IncidentPipeline::new(
            settings(),
            mapping,
            Arc::new(logs),
            Arc::new(github),
        )),
        credentials,
        ack_before_publish: false,
    }
}

fn router(server: &MockServer, credentials: Option<BasicCredentials>) -> Router {
    build_router(app_state(server, credentials))
}

fn credentials() -> BasicCredentials {
    BasicCredentials {
        username: "alerts".into(),
        password: "hunter2".into(),
    }
}

fn basic(user: &str, pass: &str) -> String {
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
    format!("Basic {token}")
}

fn post_alert(body: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/alert")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn mount_logs(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v2/entries:list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entries": [{
                "timestamp": "2024-03-18T12:05:01Z",
                "severity": "ERROR",
                "resource": {"labels": {"service_name": "svc-a"}},
                "httpRequest": {"status": 500, "requestMethod": "GET", "requestUrl": "/"}
            }]
        })))
        .mount(server)
        .await;
}

async fn mount_pulls(server: &MockServer, pulls: Value) {
    Mock::given(method("GET"))
        .and(path("/repos/OWNER/REPO_A/pulls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pulls))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_health() {
    let server = MockServer::start().await;
    let response = router(&server, None)
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_alert_posts_comment() {
    let server = MockServer::start().await;
    mount_logs(&server).await;
    mount_pulls(&server, json!([{"number": 42}])).await;
    Mock::given(method("POST"))
        .and(path("/repos/OWNER/REPO_A/issues/42/comments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 1,
            "html_url": "https://github.com/OWNER/REPO_A/pull/42#issuecomment-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = router(&server, None)
        .oneshot(post_alert(ALERT, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "posted");
    assert_eq!(body["repo"], "OWNER/REPO_A");
    assert_eq!(body["pr"], 42);
    assert_eq!(body["degraded_sections"], json!([]));

    let requests = server.received_requests().await.unwrap();
    let comment = requests
        .iter()
        .find(|r| r.url.path().ends_with("/comments"))
        .unwrap();
    let posted: Value = serde_json::from_slice(&comment.body).unwrap();
    let text = posted["body"].as_str().unwrap();
    assert!(text.starts_with("Paging @codex: 5xx ratio > 1%"));
    assert!(text.contains("status=500 GET /"));
    assert!(text.contains("Raw webhook payload"));
}

#[tokio::test]
async fn test_missing_credentials_rejected_before_any_call() {
    let server = MockServer::start().await;
    let response = router(&server, Some(credentials()))
        .oneshot(post_alert(ALERT, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers()[header::WWW_AUTHENTICATE],
        "Basic realm=\"incident-relay\""
    );
    assert_eq!(json_body(response).await["status"], "unauthorized");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_wrong_credentials_rejected() {
    let server = MockServer::start().await;
    let auth = basic("alerts", "wrong");
    let response = router(&server, Some(credentials()))
        .oneshot(post_alert(ALERT, Some(&auth)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_valid_credentials_accepted() {
    let server = MockServer::start().await;
    mount_logs(&server).await;
    mount_pulls(&server, json!([])).await;

    let auth = basic("alerts", "hunter2");
    let response = router(&server, Some(credentials()))
        .oneshot(post_alert(ALERT, Some(&auth)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "no_pull_requests");
}

#[tokio::test]
async fn test_malformed_payload() {
    let server = MockServer::start().await;
    for body in ["not json", r#"{"incident": {"condition_name": "x"}}"#] {
        let response = router(&server, None)
            .oneshot(post_alert(body, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["status"], "malformed");
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_out_of_range_incident_time_is_malformed() {
    let alert = r#"{"incident": {"started_at": 8210266876799, "affected_services": ["svc-a"]}}"#;
    for ack_before_publish in [false, true] {
        let server = MockServer::start().await;
        let mut state = app_state(&server, None);
        state.ack_before_publish = ack_before_publish;

        let response = build_router(state)
            .oneshot(post_alert(alert, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["status"], "malformed");
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_unresolved_repository_skips_collaborators() {
    let server = MockServer::start().await;
    let alert = r#"{"incident": {"started_at": 1710763500, "affected_services": ["svc-x"]}}"#;
    let response = router(&server, None)
        .oneshot(post_alert(alert, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "unresolved");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_no_pull_request_history_skips_comment() {
    let server = MockServer::start().await;
    mount_logs(&server).await;
    mount_pulls(&server, json!([])).await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/repos/OWNER/REPO_A/issues/\d+/comments$"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
        .expect(0)
        .mount(&server)
        .await;

    let response = router(&server, None)
        .oneshot(post_alert(ALERT, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "no_pull_requests");
    assert!(body["error"].as_str().unwrap().contains("OWNER/REPO_A"));

    let requests = server.received_requests().await.unwrap();
    assert!(requests
        .iter()
        .any(|r| r.url.path() == "/repos/OWNER/REPO_A/pulls"));
    assert!(!requests
        .iter()
        .any(|r| r.url.path().ends_with("/comments")));
}

#[tokio::test]
async fn test_publish_failure_is_server_error() {
    let server = MockServer::start().await;
    mount_logs(&server).await;
    mount_pulls(&server, json!([{"number": 7}])).await;
    Mock::given(method("POST"))
        .and(path("/repos/OWNER/REPO_A/issues/7/comments"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Resource not accessible"))
        .mount(&server)
        .await;

    let response = router(&server, None)
        .oneshot(post_alert(ALERT, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["status"], "error");
}

#[tokio::test]
async fn test_ack_mode_answers_before_publishing() {
    let server = MockServer::start().await;
    let mut state = app_state(&server, None);
    state.ack_before_publish = true;

    let response = build_router(state)
        .oneshot(post_alert(ALERT, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "accepted");
}

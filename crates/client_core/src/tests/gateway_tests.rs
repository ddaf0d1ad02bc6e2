use super::*;

use std::sync::Mutex as StdMutex;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};
use storage::Storage;
use tokio::net::TcpListener;

use crate::consent::{AmbientSignals, HEADER_ANALYTICS, HEADER_DO_NOT_SELL, HEADER_GPC};

#[derive(Clone, Default)]
struct Captured {
    requests: Arc<StdMutex<Vec<(String, HeaderMap, Value)>>>,
}

impl Captured {
    fn record(&self, route: &str, headers: HeaderMap, body: Value) {
        self.requests
            .lock()
            .expect("capture lock")
            .push((route.to_string(), headers, body));
    }

    fn take(&self) -> Vec<(String, HeaderMap, Value)> {
        std::mem::take(&mut *self.requests.lock().expect("capture lock"))
    }
}

async fn quick(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    captured.record("quick", headers, body.clone());
    Json(json!({
        "analysis_id": "a1",
        "url": body["url"],
        "overall_score": 72,
        "content_quality": {"score": 4, "reason": "clear"},
        "structure_optimization": {"score": 3, "reason": "ok"},
        "authority_trust": {"score": 2, "reason": "thin"},
        "ai_agent_compatibility": {"score": 3, "reason": "ok"}
    }))
}

async fn verify(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    captured.record("verify", headers, body);
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"detail": "Invalid verification code. 2 attempts remaining."})),
    )
}

async fn report(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Path(analysis_id): Path<String>,
) -> (StatusCode, String) {
    captured.record("report", headers, json!({ "analysis_id": analysis_id }));
    (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded".to_string())
}

async fn update_step(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Path(step_id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    captured.record("step", headers, body.clone());
    Json(json!({
        "id": step_id,
        "priority": "high",
        "text": "Add meta descriptions",
        "completed": body["completed"],
    }))
}

async fn hire(State(captured): State<Captured>, headers: HeaderMap) -> StatusCode {
    captured.record("hire", headers, Value::Null);
    StatusCode::OK
}

async fn garbled(State(captured): State<Captured>, headers: HeaderMap) -> String {
    captured.record("garbled", headers, Value::Null);
    "<html>not json</html>".to_string()
}

async fn spawn_backend() -> (String, Captured) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let captured = Captured::default();
    let app = Router::new()
        .route("/analyze/quick", post(quick))
        .route("/auth/verify-email", post(verify))
        .route("/report/:analysis_id", get(report))
        .route("/steps/:step_id", patch(update_step))
        .route("/hire/request", post(hire))
        .route("/resend-verification", post(garbled))
        .with_state(captured.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), captured)
}

async fn consent_store(signals: AmbientSignals) -> Arc<ConsentPreferenceStore> {
    let storage = Arc::new(Storage::new("sqlite::memory:").await.expect("db"));
    ConsentPreferenceStore::load(storage, signals).await
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("<missing>")
}

#[tokio::test]
async fn attaches_consent_headers_and_json_body() {
    let (base_url, captured) = spawn_backend().await;
    let consent = consent_store(AmbientSignals::default()).await;
    consent
        .save_preferences(shared::domain::ConsentUpdate {
            analytics: Some(true),
            ..Default::default()
        })
        .await
        .expect("save");
    let gateway = RemoteGateway::new(format!("{base_url}/"), consent);

    let response = gateway
        .quick_analyze("https://example.com")
        .await
        .expect("quick analyze");
    assert_eq!(response.analysis_id.as_str(), "a1");
    assert_eq!(response.quick_result().overall_score, 72);

    let requests = captured.take();
    assert_eq!(requests.len(), 1);
    let (_, headers, body) = &requests[0];
    assert_eq!(body["url"], json!("https://example.com"));
    assert_eq!(header(headers, HEADER_ANALYTICS), "1");
    assert_eq!(header(headers, HEADER_DO_NOT_SELL), "0");
    assert_eq!(header(headers, "X-Consent-Functional"), "0");
    assert_eq!(header(headers, "X-Consent-Marketing"), "0");
    assert_eq!(header(headers, HEADER_GPC), "0");
    assert!(header(headers, "content-type").starts_with("application/json"));
}

#[tokio::test]
async fn headers_follow_latest_consent_on_every_call() {
    let (base_url, captured) = spawn_backend().await;
    let consent = consent_store(AmbientSignals::default()).await;
    let gateway = RemoteGateway::new(base_url, consent.clone());

    consent.accept_all().await.expect("accept");
    gateway.quick_analyze("https://a.example").await.expect("first");
    consent.reject_non_essential().await.expect("reject");
    gateway.quick_analyze("https://b.example").await.expect("second");

    let requests = captured.take();
    assert_eq!(header(&requests[0].1, HEADER_DO_NOT_SELL), "0");
    assert_eq!(header(&requests[0].1, HEADER_GPC), "0");
    assert_eq!(header(&requests[1].1, HEADER_DO_NOT_SELL), "1");
    assert_eq!(header(&requests[1].1, HEADER_ANALYTICS), "0");
    assert_eq!(header(&requests[1].1, HEADER_GPC), "1");
}

#[tokio::test]
async fn surfaces_server_detail_verbatim() {
    let (base_url, _) = spawn_backend().await;
    let gateway = RemoteGateway::new(base_url, consent_store(AmbientSignals::default()).await);

    let err = gateway
        .verify_email("ada@example.com", "123456")
        .await
        .expect_err("verify fails");
    assert_eq!(err.status(), Some(400));
    assert_eq!(
        err.to_string(),
        "Invalid verification code. 2 attempts remaining."
    );
}

#[tokio::test]
async fn non_json_error_body_uses_generic_message() {
    let (base_url, captured) = spawn_backend().await;
    let gateway = RemoteGateway::new(base_url, consent_store(AmbientSignals::default()).await);

    let err = gateway
        .fetch_report(&AnalysisId::from("a1"))
        .await
        .expect_err("report fails");
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.to_string(), GENERIC_FAILURE_MESSAGE);

    let requests = captured.take();
    assert_eq!(requests[0].2["analysis_id"], json!("a1"));
}

#[tokio::test]
async fn ids_are_percent_encoded_into_one_path_segment() {
    let (base_url, captured) = spawn_backend().await;
    let gateway = RemoteGateway::new(base_url, consent_store(AmbientSignals::default()).await);

    assert!(gateway
        .segment_url(&["report", "a/b?c#d"])
        .expect("segment url")
        .ends_with("/report/a%2Fb%3Fc%23d"));

    let err = gateway
        .fetch_report(&AnalysisId::from("a/b?c#d"))
        .await
        .expect_err("report fails");
    assert_eq!(err.status(), Some(500));

    let step = gateway
        .update_step(&StepId::from("s 1/x"), false)
        .await
        .expect("update step");
    assert_eq!(step.id.as_str(), "s 1/x");

    let requests = captured.take();
    assert_eq!(requests[0].0, "report");
    assert_eq!(requests[0].2["analysis_id"], json!("a/b?c#d"));
    assert_eq!(requests[1].0, "step");
}

#[tokio::test]
async fn undecodable_success_body_is_a_decode_error() {
    let (base_url, _) = spawn_backend().await;
    let gateway = RemoteGateway::new(base_url, consent_store(AmbientSignals::default()).await);

    let err = gateway
        .resend_verification("ada@example.com")
        .await
        .expect_err("garbled body");
    assert!(matches!(err, GatewayError::Decode { .. }));
}

#[tokio::test]
async fn empty_success_body_counts_as_ack() {
    let (base_url, _) = spawn_backend().await;
    let gateway = RemoteGateway::new(base_url, consent_store(AmbientSignals::default()).await);

    let ack = gateway
        .submit_hire(&HireRequest {
            name: "Ada".into(),
            site_id: AnalysisId::from("a1"),
            ..HireRequest::default()
        })
        .await
        .expect("hire ack");
    assert!(ack.message.is_empty());
}

#[tokio::test]
async fn patches_step_completion() {
    let (base_url, captured) = spawn_backend().await;
    let gateway = RemoteGateway::new(base_url, consent_store(AmbientSignals::default()).await);

    let step = gateway
        .update_step(&StepId::from("s-9"), true)
        .await
        .expect("update step");
    assert_eq!(step.id.as_str(), "s-9");
    assert!(step.completed);
    assert_eq!(captured.take()[0].2, json!({"completed": true}));
}

#[tokio::test]
async fn unreachable_backend_is_reported_as_such() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let gateway = RemoteGateway::new(
        format!("http://{addr}"),
        consent_store(AmbientSignals::default()).await,
    );
    let err = gateway
        .quick_analyze("https://example.com")
        .await
        .expect_err("no backend");
    assert!(matches!(err, GatewayError::Unreachable { .. }));
    assert_eq!(
        err.to_string(),
        crate::error::BACKEND_UNREACHABLE_MESSAGE
    );
}

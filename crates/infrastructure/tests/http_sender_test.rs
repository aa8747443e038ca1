use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use hookcast_core::{Configuration, ControlParams, Destination, IncomingEvent, Sender};
use hookcast_infrastructure::senders::{HttpSender, RETRY_COUNT_HEADER, TRACE_ID_HEADER};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

#[derive(Clone, Default)]
struct Captured {
    requests: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
}

async fn accept(State(captured): State<Captured>, headers: HeaderMap, Json(body): Json<Value>) -> StatusCode {
    captured.requests.lock().await.push((headers, body));
    StatusCode::NO_CONTENT
}

async fn reject() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

async fn serve(captured: Captured) -> String {
    let app = Router::new()
        .route("/hook", post(accept))
        .route("/down", post(reject))
        .with_state(captured);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn event() -> IncomingEvent {
    let mut control = ControlParams::default().with_retry_count(2);
    control
        .transport_params
        .insert("headers".to_string(), json!({"X-Tenant": "acme", "X-Ignored": 5}));
    IncomingEvent::new("product.update", "core")
        .with_payload(json!({"field1": 1}))
        .with_target("product", "p-1")
        .with_trace_id("trace-123")
        .with_control(control)
}

#[tokio::test]
async fn test_posts_envelope_with_headers() {
    let captured = Captured::default();
    let base = serve(captured.clone()).await;
    let destination = Destination::new(Arc::new(
        Configuration::new("search").with_callback_url(format!("{base}/hook")),
    ));

    HttpSender::new().send_event(&event(), &destination).await.unwrap();

    let requests = captured.requests.lock().await;
    assert_eq!(requests.len(), 1);
    let (headers, body) = &requests[0];
    assert_eq!(headers[TRACE_ID_HEADER], "trace-123");
    assert_eq!(headers[RETRY_COUNT_HEADER], "2");
    assert_eq!(headers["x-tenant"], "acme");
    assert!(headers.get("x-ignored").is_none());
    assert_eq!(body["event_key"], "product.update");
    assert_eq!(body["payload"], json!({"field1": 1}));
    assert_eq!(body["target_id"], "p-1");
}

#[tokio::test]
async fn test_callback_override_is_used() {
    let captured = Captured::default();
    let base = serve(captured.clone()).await;
    let destination = Destination::new(Arc::new(
        Configuration::new("search").with_callback_url("http://invalid.localdomain/hook"),
    ))
    .with_callback_url_override(format!("{base}/hook"));

    HttpSender::new().send_event(&event(), &destination).await.unwrap();
    assert_eq!(captured.requests.lock().await.len(), 1);
}

#[tokio::test]
async fn test_non_success_status_is_retryable() {
    let base = serve(Captured::default()).await;
    let destination = Destination::new(Arc::new(
        Configuration::new("search").with_callback_url(format!("{base}/down")),
    ));

    let err = HttpSender::new().send_event(&event(), &destination).await.unwrap_err();
    assert!(!err.is_unretryable());
}

#[tokio::test]
async fn test_malformed_callback_is_unretryable() {
    let destination = Destination::new(Arc::new(
        Configuration::new("search").with_callback_url("::not a url::"),
    ));
    let err = HttpSender::new().send_event(&event(), &destination).await.unwrap_err();
    assert!(err.is_unretryable());
}

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::routes::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "in_flight": state.controller.dispatcher().in_flight(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "hookcast",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

use axum::{extract::State, Json};
use serde::Serialize;

use crate::routes::AppState;

#[derive(Debug, Serialize)]
pub struct DispatchStats {
    pub hooks: usize,
    pub in_flight: usize,
    pub transports: Vec<String>,
    pub recent_errors: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

pub async fn get_stats(State(state): State<AppState>) -> Json<DispatchStats> {
    let dispatcher = state.controller.dispatcher();
    Json(DispatchStats {
        hooks: state.controller.hook_count().await,
        in_flight: dispatcher.in_flight(),
        transports: dispatcher.senders().transports(),
        recent_errors: dispatcher.error_count().await,
        timestamp: chrono::Utc::now(),
    })
}

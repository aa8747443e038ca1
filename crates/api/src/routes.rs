use axum::{
    routing::{get, post},
    Router,
};
use hookcast_dispatcher::EventController;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::handlers::{
    events::receive_event, health::health_check, metrics::render_metrics, stats::get_stats,
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<EventController>,
    /// 未安装 Prometheus 记录器时 `/metrics` 返回 404
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(controller: Arc<EventController>) -> Self {
        Self {
            controller,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/events", post(receive_event))
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

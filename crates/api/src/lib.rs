//! # Hookcast API
//!
//! 事件接入的 HTTP 接口。接口只负责解析和回执，分发全部交给
//! [`hookcast_dispatcher::EventController`]。
//!
//! ## API 端点
//!
//! - `POST /events` - 提交事件，返回 `202` 回执或 `422` 错误
//! - `GET /health` - 健康检查，附带进行中的分发任务数
//! - `GET /stats` - 目标配置数量、传输方式和最近错误数
//! - `GET /metrics` - Prometheus 文本格式指标
//!
//! ## 使用示例
//!
//! ```ignore
//! use hookcast_api::{create_app, routes::AppState};
//!
//! let state = AppState::new(controller).with_metrics(prometheus_handle);
//! let app = create_app(state, 1024 * 1024);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```
//!
//! ```bash
//! curl -X POST http://localhost:8080/events \
//!   -H "Content-Type: application/json" \
//!   -d '{"event_key":"product.update","source":"core","target_id":"p-1","payload":{"price":10}}'
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use middleware::{cors_layer, log_requests};
use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(state: AppState, max_body_bytes: usize) -> Router {
    create_routes(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer())
            .layer(DefaultBodyLimit::max(max_body_bytes))
            .layer(axum::middleware::from_fn(log_requests)),
    )
}

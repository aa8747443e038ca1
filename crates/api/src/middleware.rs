use std::time::Instant;

use axum::{
    extract::Request,
    http::{header::CONTENT_TYPE, Method},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

/// 探活和指标抓取的路径，只记 debug 日志
const QUIET_PATHS: [&str; 2] = ["/health", "/metrics"];

pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if QUIET_PATHS.contains(&path.as_str()) {
        debug!(%method, %path, status = status.as_u16(), elapsed_ms, "请求已处理");
    } else if status.is_client_error() || status.is_server_error() {
        warn!(%method, %path, status = status.as_u16(), elapsed_ms, "请求未被接受");
    } else {
        info!(%method, %path, status = status.as_u16(), elapsed_ms, "请求已处理");
    }

    response
}

/// 事件只通过 `POST /events` 提交，其余接口只读
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
}

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use hookcast_core::IncomingEvent;
use hookcast_dispatcher::DispatchReceipt;
use tracing::debug;

use crate::{
    error::{ApiError, ApiResult},
    routes::AppState,
};

/// 接收一个事件并交给控制器分发
///
/// 请求体无法解析或事件校验失败时返回 `422`；
/// 否则返回 `202`，回执中列出已启动分发任务的目标。
pub async fn receive_event(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<DispatchReceipt>)> {
    let event: IncomingEvent =
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidEvent(e.to_string()))?;

    debug!(event_key = %event.event_key, source = %event.source, "收到事件");

    let receipt = state.controller.handle(event).await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hookcast_core::DispatchError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("无效事件: {0}")]
    InvalidEvent(String),

    #[error("分发错误: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("指标导出未启用")]
    MetricsDisabled,

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidEvent(_) => StatusCode::UNPROCESSABLE_ENTITY,
            // 控制器只在校验失败时返回执行错误
            ApiError::Dispatch(DispatchError::Execution { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Dispatch(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::MetricsDisabled => StatusCode::NOT_FOUND,
        };

        let body = Json(json!({
            "accepted": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

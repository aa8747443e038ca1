use serde::Serialize;
use thiserror::Error;

/// 引擎错误类型定义
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HookcastError {
    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("无效的时长: {input} - {message}")]
    InvalidDuration { input: String, message: String },

    #[error("存储错误: {0}")]
    Store(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("表达式错误: {0}")]
    Expression(String),

    /// 目标配置错误，重试无意义
    #[error("不可重试的错误: {0}")]
    Unretryable(String),

    #[error("无效的事件: {0}")]
    InvalidEvent(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl HookcastError {
    pub fn is_unretryable(&self) -> bool {
        matches!(self, HookcastError::Unretryable(_))
    }
}

impl From<serde_json::Error> for HookcastError {
    fn from(e: serde_json::Error) -> Self {
        HookcastError::Serialization(e.to_string())
    }
}

/// 分发错误
///
/// - `Execution`: 事件本身无效，不会进入分发
/// - `Dispatcher`: 某个目标发送失败，可以重试
/// - `Unretryable`: 发送时发现目标配置错误，不能重试
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchError {
    #[error("执行错误: {message}")]
    Execution { message: String },

    #[error("分发错误: event={event_key} destination={destination}: {message}")]
    Dispatcher {
        event_key: String,
        destination: String,
        trace_id: Option<String>,
        message: String,
    },

    #[error("不可重试的分发错误: event={event_key} destination={destination}: {message}")]
    Unretryable {
        event_key: String,
        destination: String,
        message: String,
    },
}

impl DispatchError {
    pub fn execution(message: impl Into<String>) -> Self {
        DispatchError::Execution {
            message: message.into(),
        }
    }

    /// 外部重试机制只应对返回 true 的错误重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Dispatcher { .. })
    }

    pub fn destination(&self) -> Option<&str> {
        match self {
            DispatchError::Execution { .. } => None,
            DispatchError::Dispatcher { destination, .. }
            | DispatchError::Unretryable { destination, .. } => Some(destination),
        }
    }
}

/// 统一的Result类型
pub type HookcastResult<T> = std::result::Result<T, HookcastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let transient = DispatchError::Dispatcher {
            event_key: "product.update".to_string(),
            destination: "search".to_string(),
            trace_id: None,
            message: "connection refused".to_string(),
        };
        let permanent = DispatchError::Unretryable {
            event_key: "product.update".to_string(),
            destination: "search".to_string(),
            message: "invalid queue name".to_string(),
        };

        assert!(transient.is_retryable());
        assert!(!permanent.is_retryable());
        assert!(!DispatchError::execution("bad event").is_retryable());
        assert_eq!(permanent.destination(), Some("search"));
    }

    #[test]
    fn test_dispatch_error_serializes_with_kind() {
        let err = DispatchError::execution("missing event_key");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["kind"], "execution");
        assert_eq!(value["message"], "missing event_key");
    }
}

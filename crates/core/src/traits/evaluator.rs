use serde_json::Value;

use crate::HookcastResult;

/// 布尔表达式求值器
///
/// `document` 是事件负载，`config` 是目标配置。表达式格式错误或引用了
/// 不存在的字段时必须返回错误，而不是 panic。
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, document: &Value, config: &Value) -> HookcastResult<bool>;
}

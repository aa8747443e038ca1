use async_trait::async_trait;

use crate::models::{Destination, IncomingEvent};
use crate::HookcastResult;

/// 可插拔的传输层
///
/// 目标配置错误（例如非法的队列名、无法解析的地址）必须返回
/// [`HookcastError::Unretryable`](crate::HookcastError::Unretryable)，
/// 其余错误视为暂时性错误。
#[async_trait]
pub trait Sender: Send + Sync {
    /// 传输选择器名称，例如 `http`
    fn name(&self) -> &str;

    async fn send_event(&self, event: &IncomingEvent, destination: &Destination) -> HookcastResult<()>;
}

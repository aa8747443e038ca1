use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::{Destination, IncomingEvent};
use crate::HookcastResult;

/// 带剩余TTL的存储值
#[derive(Debug, Clone, PartialEq)]
pub struct StoredValue {
    pub value: Value,
    /// `None` 表示没有过期时间
    pub ttl_remaining: Option<Duration>,
}

/// 一次性取出的队列内容
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedValues {
    pub values: Vec<Value>,
    pub ttl_remaining: Option<Duration>,
}

/// 条件写入的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Created,
    Exists { ttl_remaining: Option<Duration> },
}

impl SetOutcome {
    pub fn created(&self) -> bool {
        matches!(self, SetOutcome::Created)
    }
}

/// 支撑节流状态的键值存储
///
/// 所有实现都必须串行化读-改-写序列：进程内实现通过内部互斥锁，
/// 网络实现通过分布式锁。`ttl` 为零表示不过期。
#[async_trait]
pub trait Store: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> HookcastResult<Option<StoredValue>>;

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> HookcastResult<bool>;

    /// 键不存在时写入；存在时返回其剩余TTL，不做修改
    async fn set_if_absent(&self, key: &str, value: Value, ttl: Duration) -> HookcastResult<SetOutcome>;

    /// 替换已有键的值并保留TTL，键不存在时返回 false
    async fn update(&self, key: &str, value: Value) -> HookcastResult<bool>;

    async fn remove(&self, key: &str) -> HookcastResult<bool>;

    /// 追加到FIFO队列并刷新队列TTL，返回追加后的队列长度
    async fn enqueue(&self, key: &str, value: Value, ttl: Duration) -> HookcastResult<usize>;

    /// 取出并清空队列
    async fn dequeue_all(&self, key: &str) -> HookcastResult<Option<QueuedValues>>;

    fn data_key(
        &self,
        event: &IncomingEvent,
        destination: &Destination,
        prefix: &str,
        suffix: &str,
    ) -> String {
        build_data_key(event, destination, prefix, suffix)
    }
}

/// `{prefix}:{event_key}:{destination}:{target_id}[:{suffix}]`，空的前缀和后缀省略
pub fn build_data_key(
    event: &IncomingEvent,
    destination: &Destination,
    prefix: &str,
    suffix: &str,
) -> String {
    let mut parts = Vec::with_capacity(5);
    if !prefix.is_empty() {
        parts.push(prefix);
    }
    parts.push(event.event_key.as_str());
    parts.push(destination.name());
    parts.push(event.target_id_or_empty());
    if !suffix.is_empty() {
        parts.push(suffix);
    }
    parts.join(":")
}

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use hookcast_core::traits::SetOutcome;
use hookcast_core::{HookcastResult, IncomingEvent, Store};

/// 节流判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleDecision {
    pub allowed: bool,
    /// 当前窗口的剩余时间
    pub ttl_remaining: Duration,
}

/// 节流期间被压下的一次触发
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottledEntry {
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Value>,
    pub queued_at: DateTime<Utc>,
}

impl ThrottledEntry {
    pub fn from_event(event: &IncomingEvent) -> Self {
        Self {
            payload: event.payload.clone(),
            document: event.target_document.clone(),
            queued_at: Utc::now(),
        }
    }
}

/// 把积压条目按入队顺序挂到事件上
pub fn attach_queued(event: &mut IncomingEvent, entries: Vec<ThrottledEntry>) {
    for entry in entries {
        event.throttled_payloads.push(entry.payload);
        if let Some(document) = entry.document {
            event.throttled_documents.push(document);
        }
    }
}

/// 每个窗口只放行一次触发
///
/// 窗口由存储中带TTL的键表示：键不存在时写入并放行，存在时压下。
pub struct Throttler {
    store: Arc<dyn Store>,
}

impl Throttler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// `period` 为零时总是放行
    pub async fn can_trigger(&self, key: &str, period: Duration) -> HookcastResult<ThrottleDecision> {
        if period.is_zero() {
            return Ok(ThrottleDecision {
                allowed: true,
                ttl_remaining: Duration::ZERO,
            });
        }

        let marker = json!({ "opened_at": Utc::now().to_rfc3339() });
        let outcome = self.store.set_if_absent(key, marker, period).await?;
        if outcome.created() {
            debug!(key = %key, "节流窗口已打开: {:?}", period);
            return Ok(ThrottleDecision {
                allowed: true,
                ttl_remaining: period,
            });
        }

        let ttl_remaining = match outcome {
            SetOutcome::Exists { ttl_remaining } => ttl_remaining.unwrap_or(Duration::ZERO),
            SetOutcome::Created => Duration::ZERO,
        };
        debug!(key = %key, "节流窗口未结束，剩余 {:?}", ttl_remaining);
        Ok(ThrottleDecision {
            allowed: false,
            ttl_remaining,
        })
    }

    /// 记录被压下的触发，返回积压长度。积压保留两个节流周期。
    pub async fn queue_suppressed(
        &self,
        queue_key: &str,
        event: &IncomingEvent,
        period: Duration,
    ) -> HookcastResult<usize> {
        let entry = serde_json::to_value(ThrottledEntry::from_event(event))?;
        let length = self.store.enqueue(queue_key, entry, period * 2).await?;
        debug!(key = %queue_key, "节流积压长度: {}", length);
        Ok(length)
    }

    /// 取出并清空积压
    pub async fn drain_queued(&self, queue_key: &str) -> HookcastResult<Vec<ThrottledEntry>> {
        let Some(queued) = self.store.dequeue_all(queue_key).await? else {
            return Ok(Vec::new());
        };

        let mut entries = Vec::with_capacity(queued.values.len());
        for value in queued.values {
            match serde_json::from_value::<ThrottledEntry>(value) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(key = %queue_key, "忽略无法解析的积压条目: {}", e),
            }
        }
        Ok(entries)
    }
}

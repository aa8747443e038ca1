//! 发送器实现

pub mod amqp;
pub mod console;
pub mod http;

use serde::Serialize;
use serde_json::Value;

use hookcast_core::{Destination, IncomingEvent};

pub use amqp::AmqpSender;
pub use console::ConsoleSender;
pub use http::{HttpSender, HttpSenderConfig};

pub const EVENT_HEADER: &str = "X-Hookcast-Event";
pub const TRACE_ID_HEADER: &str = "X-Hookcast-Trace-Id";
pub const RETRY_COUNT_HEADER: &str = "X-Hookcast-Retry-Count";

/// 投递给目标的消息体，所有传输共用
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope<'a> {
    pub event_key: &'a str,
    pub source: &'a str,
    pub payload: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<&'a str>,
    #[serde(skip_serializing_if = "is_empty")]
    pub throttled_payloads: &'a [Value],
    #[serde(skip_serializing_if = "is_empty")]
    pub throttled_documents: &'a [Value],
    /// 只有配置了 `include_document` 时才附带
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_document: Option<&'a Value>,
}

fn is_empty(values: &&[Value]) -> bool {
    values.is_empty()
}

impl<'a> Envelope<'a> {
    pub fn new(event: &'a IncomingEvent, destination: &Destination) -> Self {
        let target_document = if destination.config().include_document {
            event.target_document.as_ref()
        } else {
            None
        };
        Self {
            event_key: &event.event_key,
            source: &event.source,
            payload: &event.payload,
            target_type: event.target_type.as_deref(),
            target_id: event.target_id.as_deref(),
            trace_id: event.trace_id.as_deref(),
            throttled_payloads: &event.throttled_payloads,
            throttled_documents: &event.throttled_documents,
            target_document,
        }
    }
}

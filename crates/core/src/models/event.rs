use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{HookcastError, HookcastResult};

use super::ControlParams;

/// 进入引擎的领域事件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomingEvent {
    #[serde(default)]
    pub event_key: String,

    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub payload: Value,

    #[serde(default, skip_serializing_if = "ControlParams::is_empty")]
    pub control: ControlParams,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_document: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// 节流期间被压下的负载，在下一次放行的分发时附带
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub throttled_payloads: Vec<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub throttled_documents: Vec<Value>,
}

impl IncomingEvent {
    pub fn new(event_key: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            event_key: event_key.into(),
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_control(mut self, control: ControlParams) -> Self {
        self.control = control;
        self
    }

    pub fn with_target(mut self, target_type: impl Into<String>, target_id: impl Into<String>) -> Self {
        self.target_type = Some(target_type.into());
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_target_id(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_target_document(mut self, document: Value) -> Self {
        self.target_document = Some(document);
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// 动作键和来源都非空，并且目标类型、目标ID、非空负载至少有一个
    pub fn validate(&self) -> HookcastResult<()> {
        if self.event_key.trim().is_empty() {
            return Err(HookcastError::InvalidEvent("event_key 不能为空".to_string()));
        }
        if self.source.trim().is_empty() {
            return Err(HookcastError::InvalidEvent("source 不能为空".to_string()));
        }

        let has_target_type = self.target_type.as_deref().is_some_and(|s| !s.is_empty());
        let has_target_id = self.target_id.as_deref().is_some_and(|s| !s.is_empty());
        if !has_target_type && !has_target_id && !has_payload(&self.payload) {
            return Err(HookcastError::InvalidEvent(
                "target_type、target_id 和 payload 至少需要一个".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn target_id_or_empty(&self) -> &str {
        self.target_id.as_deref().unwrap_or("")
    }
}

fn has_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_event_is_invalid() {
        let event: IncomingEvent = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(event.validate(), Err(HookcastError::InvalidEvent(_))));
    }

    #[test]
    fn test_event_requires_target_or_payload() {
        let event = IncomingEvent::new("product.update", "core");
        assert!(!event.is_valid());

        assert!(event.clone().with_target_id("product_id").is_valid());
        assert!(event.clone().with_payload(json!({"field1": 1})).is_valid());
        assert!(!event.clone().with_payload(json!({})).is_valid());
    }

    #[test]
    fn test_missing_source_is_invalid() {
        let event = IncomingEvent::new("product.update", "").with_target_id("1");
        assert!(!event.is_valid());
    }

    #[test]
    fn test_wire_roundtrip_omits_empty_fields() {
        let event: IncomingEvent = serde_json::from_value(json!({
            "event_key": "product.update",
            "source": "core",
            "payload": {"field1": 1},
            "target_id": "product_id",
            "trace_id": "abc"
        }))
        .unwrap();
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("control").is_none());
        assert!(value.get("throttled_payloads").is_none());
        assert_eq!(value["trace_id"], "abc");
    }
}

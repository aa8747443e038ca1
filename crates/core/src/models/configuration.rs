use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::duration;

/// 单个目标的静态分发策略
///
/// 启动时加载，进程生命周期内不可变；多个 [`Destination`](super::Destination)
/// 可以引用同一份配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub id: String,

    pub name: String,

    /// 订阅的事件动作键，去重并保持原有顺序
    #[serde(default, deserialize_with = "deserialize_actions")]
    pub actions: Vec<String>,

    #[serde(default)]
    pub source: String,

    /// 传输选择器，为空时使用默认的 HTTP 发送器
    #[serde(default)]
    pub sender: String,

    #[serde(default)]
    pub callback_url: String,

    /// 布尔校验表达式
    #[serde(default)]
    pub validate: String,

    #[serde(default, with = "duration::serde_opt")]
    pub throttle: Option<Duration>,

    #[serde(default)]
    pub throttle_trailing: bool,

    #[serde(default, with = "duration::serde_opt")]
    pub delay: Option<Duration>,

    #[serde(default, with = "duration::serde_list")]
    pub retry_backoff: Vec<Duration>,

    #[serde(default)]
    pub include_document: bool,

    #[serde(default)]
    pub allow_loopback: bool,

    #[serde(default)]
    pub document_store: String,
}

impl Configuration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            actions: Vec::new(),
            source: String::new(),
            sender: String::new(),
            callback_url: String::new(),
            validate: String::new(),
            throttle: None,
            throttle_trailing: false,
            delay: None,
            retry_backoff: Vec::new(),
            include_document: false,
            allow_loopback: false,
            document_store: String::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = dedup_preserving_order(actions.into_iter().map(Into::into));
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = url.into();
        self
    }

    pub fn with_validate(mut self, expression: impl Into<String>) -> Self {
        self.validate = expression.into();
        self
    }

    pub fn with_throttle(mut self, period: Duration, trailing: bool) -> Self {
        self.throttle = Some(period);
        self.throttle_trailing = trailing;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_retry_backoff(mut self, tiers: Vec<Duration>) -> Self {
        self.retry_backoff = tiers;
        self
    }

    pub fn with_include_document(mut self, include: bool) -> Self {
        self.include_document = include;
        self
    }

    pub fn with_allow_loopback(mut self, allow: bool) -> Self {
        self.allow_loopback = allow;
        self
    }

    pub fn with_document_store(mut self, store: impl Into<String>) -> Self {
        self.document_store = store.into();
        self
    }

    /// 节流周期，未配置时为零（不节流）
    pub fn throttle_period(&self) -> Duration {
        self.throttle.unwrap_or(Duration::ZERO)
    }

    pub fn delay_period(&self) -> Duration {
        self.delay.unwrap_or(Duration::ZERO)
    }

    pub fn subscribes_to(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }
}

fn dedup_preserving_order(actions: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = Vec::new();
    for action in actions {
        if !action.is_empty() && !seen.contains(&action) {
            seen.push(action);
        }
    }
    seen
}

fn deserialize_actions<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<String>> = Option::deserialize(deserializer)?;
    Ok(dedup_preserving_order(raw.unwrap_or_default().into_iter()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let config: Configuration = serde_json::from_value(json!({
            "id": "42",
            "name": "search-indexer",
            "callback_url": "http://search.local/hooks",
            "validate": "document.field1 > 0",
            "actions": ["product.update", "product.create", "product.update"],
            "source": "search",
            "throttle": "30s",
            "throttle_trailing": true,
            "delay": "10s",
            "retry_backoff": "5s,30s,200s,600s",
            "include_document": true,
            "allow_loopback": false,
            "sender": "http",
            "document_store": "catalog"
        }))
        .unwrap();

        assert_eq!(config.actions, vec!["product.update", "product.create"]);
        assert_eq!(config.throttle_period(), Duration::from_secs(30));
        assert!(config.throttle_trailing);
        assert_eq!(config.delay_period(), Duration::from_secs(10));
        assert_eq!(config.retry_backoff.len(), 4);
        assert_eq!(config.retry_backoff[3], Duration::from_secs(600));
        assert!(config.subscribes_to("product.create"));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Configuration = serde_json::from_value(json!({"name": "audit"})).unwrap();
        assert_eq!(config.throttle_period(), Duration::ZERO);
        assert_eq!(config.delay_period(), Duration::ZERO);
        assert!(config.retry_backoff.is_empty());
        assert!(!config.allow_loopback);
    }

    #[test]
    fn test_invalid_duration_is_rejected() {
        let result: Result<Configuration, _> =
            serde_json::from_value(json!({"name": "audit", "throttle": "ten seconds"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_serialization_keeps_duration_strings() {
        let config = Configuration::new("audit")
            .with_delay(Duration::from_secs(90))
            .with_retry_backoff(vec![Duration::from_secs(5), Duration::from_secs(30)]);
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["delay"], "90s");
        assert_eq!(value["retry_backoff"], "5s,30s");
        assert_eq!(value["throttle"], "");
    }
}

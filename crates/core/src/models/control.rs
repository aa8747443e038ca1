use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// 事件的控制参数
///
/// 已知指令映射为类型化字段，其余键原样保留在 `extra` 中，
/// 由下游组件（例如某个具体发送器）按需读取。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlParams {
    /// 定向重投：只分发给列出的目标
    #[serde(
        default,
        deserialize_with = "deserialize_hook_names",
        skip_serializing_if = "Option::is_none"
    )]
    pub desired_hooks: Option<Vec<String>>,

    /// 上游已经消耗掉的延迟（秒）
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub outstanding_delay_seconds: Option<f64>,

    #[serde(
        default,
        deserialize_with = "deserialize_lenient_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub retry_count: Option<u32>,

    /// 传输层参数，例如 HTTP 额外请求头
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub transport_params: Map<String, Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ControlParams {
    pub fn is_empty(&self) -> bool {
        self.desired_hooks.is_none()
            && self.outstanding_delay_seconds.is_none()
            && self.retry_count.is_none()
            && self.transport_params.is_empty()
            && self.extra.is_empty()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count.unwrap_or(0)
    }

    pub fn with_desired_hooks<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.desired_hooks = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_outstanding_delay_seconds(mut self, seconds: f64) -> Self {
        self.outstanding_delay_seconds = Some(seconds);
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }
}

/// 接受字符串数组、任意值数组（字符串化）或逗号分隔的字符串
fn deserialize_hook_names<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    let names = match raw {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "desired_hooks must be a list, got {other}"
            )))
        }
    };
    Ok(Some(names))
}

fn deserialize_lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid number '{s}'"))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected number, got {other}"
        ))),
    }
}

fn deserialize_lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match deserialize_lenient_f64(deserializer)? {
        None => Ok(None),
        Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64 => Ok(Some(n as u32)),
        Some(n) => Err(serde::de::Error::custom(format!(
            "expected non-negative integer, got {n}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recognized_keys_are_typed() {
        let control: ControlParams = serde_json::from_value(json!({
            "desired_hooks": ["search", "analytics"],
            "outstanding_delay_seconds": 10,
            "retry_count": "2",
            "transport_params": {"headers": {"X-Tenant": "acme"}},
            "priority": "high"
        }))
        .unwrap();

        assert_eq!(
            control.desired_hooks,
            Some(vec!["search".to_string(), "analytics".to_string()])
        );
        assert_eq!(control.outstanding_delay_seconds, Some(10.0));
        assert_eq!(control.retry_count(), 2);
        assert_eq!(control.transport_params["headers"]["X-Tenant"], "acme");
        assert_eq!(control.extra["priority"], "high");
    }

    #[test]
    fn test_desired_hooks_from_generic_list() {
        let control: ControlParams =
            serde_json::from_value(json!({"desired_hooks": ["search", 42, null]})).unwrap();
        assert_eq!(
            control.desired_hooks,
            Some(vec!["search".to_string(), "42".to_string()])
        );

        let control: ControlParams =
            serde_json::from_value(json!({"desired_hooks": "search, analytics"})).unwrap();
        assert_eq!(
            control.desired_hooks,
            Some(vec!["search".to_string(), "analytics".to_string()])
        );
    }

    #[test]
    fn test_invalid_retry_count_is_rejected() {
        let result: Result<ControlParams, _> =
            serde_json::from_value(json!({"retry_count": -1}));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_control() {
        let control: ControlParams = serde_json::from_value(json!({})).unwrap();
        assert!(control.is_empty());
        assert_eq!(control.retry_count(), 0);
        assert_eq!(serde_json::to_value(&control).unwrap(), json!({}));
    }
}

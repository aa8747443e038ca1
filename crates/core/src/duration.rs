//! `<数字><单位>` 形式的时长解析，单位支持 ms、s、m、h

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

use crate::{HookcastError, HookcastResult};

/// 解析单个时长字符串，空字符串返回 `None`
pub fn parse_duration(input: &str) -> HookcastResult<Option<Duration>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let split_at = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .ok_or_else(|| invalid(input, "缺少时间单位"))?;
    let (number, unit) = trimmed.split_at(split_at);

    if number.is_empty() {
        return Err(invalid(input, "缺少数值"));
    }

    let nanos_per_unit: u128 = match unit {
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60_000_000_000,
        "h" => 3_600_000_000_000,
        other => return Err(invalid(input, &format!("不支持的单位 '{other}'"))),
    };

    // 按十进制精确换算，避免浮点误差
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if fraction.contains('.') || (whole.is_empty() && fraction.is_empty()) {
        return Err(invalid(input, "数值格式错误"));
    }
    let fraction = &fraction[..fraction.len().min(18)];
    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid(input, "数值超出范围"))?
    };
    let fraction_nanos = if fraction.is_empty() {
        0
    } else {
        let digits: u128 = fraction.parse().map_err(|_| invalid(input, "数值格式错误"))?;
        digits * nanos_per_unit / 10u128.pow(fraction.len() as u32)
    };

    let total = whole
        .checked_mul(nanos_per_unit)
        .and_then(|n| n.checked_add(fraction_nanos))
        .ok_or_else(|| invalid(input, "数值超出范围"))?;
    let secs = u64::try_from(total / 1_000_000_000).map_err(|_| invalid(input, "数值超出范围"))?;
    Ok(Some(Duration::new(secs, (total % 1_000_000_000) as u32)))
}

/// 解析逗号分隔的时长列表，空项被忽略
pub fn parse_duration_list(input: &str) -> HookcastResult<Vec<Duration>> {
    let mut durations = Vec::new();
    for part in input.split(',') {
        if let Some(duration) = parse_duration(part)? {
            durations.push(duration);
        }
    }
    Ok(durations)
}

/// 格式化为可以被 [`parse_duration`] 解析回来的字符串
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    let millis = nanos / 1_000_000;
    let sub_millis = nanos % 1_000_000;
    if sub_millis != 0 {
        let fraction = format!("{sub_millis:06}");
        return format!("{millis}.{}ms", fraction.trim_end_matches('0'));
    }
    if millis % 3_600_000 == 0 {
        format!("{}h", millis / 3_600_000)
    } else if millis % 60_000 == 0 {
        format!("{}m", millis / 60_000)
    } else if millis % 1_000 == 0 {
        format!("{}s", millis / 1_000)
    } else {
        format!("{millis}ms")
    }
}

fn invalid(input: &str, message: &str) -> HookcastError {
    HookcastError::InvalidDuration {
        input: input.to_string(),
        message: message.to_string(),
    }
}

/// `Option<Duration>` 字段的 serde 适配
pub mod serde_opt {
    use super::*;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_str(&format_duration(*duration)),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            Some(text) => parse_duration(&text).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

/// 逗号分隔时长列表字段的 serde 适配
pub mod serde_list {
    use super::*;

    pub fn serialize<S>(value: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let joined = value
            .iter()
            .map(|d| format_duration(*d))
            .collect::<Vec<_>>()
            .join(",");
        serializer.serialize_str(&joined)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            Some(text) => parse_duration_list(&text).map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

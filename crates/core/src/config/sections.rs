use serde::{Deserialize, Serialize};

/// 存储类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    #[default]
    Memory,
    Redis,
}

/// HTTP 接入配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_address.is_empty() {
            return Err(anyhow::anyhow!("监听地址不能为空"));
        }
        if self.max_body_bytes == 0 {
            return Err(anyhow::anyhow!("请求体大小限制必须大于0"));
        }
        Ok(())
    }
}

/// Redis 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    pub key_prefix: String,
    /// 分布式锁的过期时间（毫秒）
    pub lock_ttl_ms: u64,
    /// 获取锁失败后的重试间隔（毫秒）
    pub lock_retry_ms: u64,
    pub lock_attempts: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            key_prefix: "hookcast".to_string(),
            lock_ttl_ms: 5_000,
            lock_retry_ms: 20,
            lock_attempts: 50,
        }
    }
}

impl RedisConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(anyhow::anyhow!("Redis地址必须以 redis:// 或 rediss:// 开头"));
        }
        if self.lock_ttl_ms == 0 {
            return Err(anyhow::anyhow!("Redis锁过期时间必须大于0"));
        }
        if self.lock_attempts == 0 {
            return Err(anyhow::anyhow!("Redis锁重试次数必须大于0"));
        }
        Ok(())
    }
}

/// 节流状态存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    #[serde(rename = "type")]
    pub r#type: StoreType,
    /// 进程内存储的过期清理间隔（毫秒）
    pub sweep_interval_ms: u64,
    /// 节流队列的最大长度，超出后丢弃最旧的条目
    pub max_queue_len: usize,
    pub redis: RedisConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            r#type: StoreType::Memory,
            sweep_interval_ms: 1_000,
            max_queue_len: 100,
            redis: RedisConfig::default(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_queue_len == 0 {
            return Err(anyhow::anyhow!("节流队列长度上限必须大于0"));
        }
        match self.r#type {
            StoreType::Memory if self.sweep_interval_ms == 0 => {
                Err(anyhow::anyhow!("内存存储清理间隔必须大于0"))
            }
            StoreType::Memory => Ok(()),
            StoreType::Redis => self.redis.validate(),
        }
    }
}

/// 发送器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// 配置未指定传输方式时使用的发送器
    pub default_transport: String,
    pub http_timeout_seconds: u64,
    pub user_agent: String,
    /// 未配置时不注册 AMQP 发送器
    pub amqp_url: Option<String>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            default_transport: "http".to_string(),
            http_timeout_seconds: 10,
            user_agent: format!("hookcast/{}", env!("CARGO_PKG_VERSION")),
            amqp_url: None,
        }
    }
}

impl SenderConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_transport.is_empty() {
            return Err(anyhow::anyhow!("默认传输方式不能为空"));
        }
        if self.http_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("HTTP超时时间必须大于0"));
        }
        Ok(())
    }
}

/// 分发器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// 是否启用 `<NAME>_ENABLED` 环境开关过滤器
    pub kill_switch_enabled: bool,
    /// 未配置重试阶梯时的默认退避（秒）
    pub default_retry_backoff_seconds: u64,
    /// 关闭时等待进行中任务的最长时间（秒）
    pub drain_timeout_seconds: u64,
    /// 分发器保留的最近错误条数
    pub max_retained_errors: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            kill_switch_enabled: true,
            default_retry_backoff_seconds: 30,
            drain_timeout_seconds: 30,
            max_retained_errors: 1024,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.drain_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("关闭等待时间必须大于0"));
        }
        if self.max_retained_errors == 0 {
            return Err(anyhow::anyhow!("保留错误条数必须大于0"));
        }
        Ok(())
    }
}

/// 目标配置文件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    pub path: String,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            path: "config/hooks.json".to_string(),
        }
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(anyhow::anyhow!("无效的日志级别: {}", self.log_level));
        }
        if !["pretty", "json"].contains(&self.log_format.as_str()) {
            return Err(anyhow::anyhow!("无效的日志格式: {}", self.log_format));
        }
        Ok(())
    }
}

//! 配置管理
//!
//! - **app_config**: 进程级配置，来源依次为默认值、TOML 文件、`HOOKCAST_` 环境变量
//! - **sections**: 各配置分节
//! - **hooks**: 目标配置（JSON 数组）的加载

pub mod app_config;
pub mod hooks;
pub mod sections;

pub use app_config::AppConfig;
pub use hooks::{load_configurations, parse_configurations};
pub use sections::{
    DispatcherConfig, HooksConfig, ObservabilityConfig, RedisConfig, SenderConfig, ServerConfig,
    StoreConfig, StoreType,
};

//! 节流状态存储的实现

pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use hookcast_core::config::{StoreConfig, StoreType};
use hookcast_core::{HookcastResult, Store};

pub use memory::{MemoryStore, MemoryStoreConfig};
pub use redis::{RedisStore, RedisStoreConfig};

/// 按配置创建存储
///
/// 同时返回进程内存储的具体句柄，便于关闭时停止清扫任务。
pub async fn build_store(config: &StoreConfig) -> HookcastResult<(Arc<dyn Store>, Option<Arc<MemoryStore>>)> {
    match config.r#type {
        StoreType::Memory => {
            let store = Arc::new(MemoryStore::with_config(MemoryStoreConfig {
                sweep_interval: Duration::from_millis(config.sweep_interval_ms),
                max_queue_len: config.max_queue_len,
            }));
            Ok((store.clone(), Some(store)))
        }
        StoreType::Redis => {
            let store = RedisStore::connect(RedisStoreConfig::from_config(
                &config.redis,
                config.max_queue_len,
            ))
            .await?;
            Ok((Arc::new(store), None))
        }
    }
}

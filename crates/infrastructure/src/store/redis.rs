use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use hookcast_core::config::RedisConfig;
use hookcast_core::traits::{QueuedValues, SetOutcome, Store, StoredValue};
use hookcast_core::{HookcastError, HookcastResult};

const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Redis 存储配置
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    pub url: String,
    pub key_prefix: String,
    pub lock_ttl: Duration,
    pub lock_retry: Duration,
    pub lock_attempts: u32,
    pub max_queue_len: usize,
}

impl RedisStoreConfig {
    pub fn from_config(config: &RedisConfig, max_queue_len: usize) -> Self {
        Self {
            url: config.url.clone(),
            key_prefix: config.key_prefix.clone(),
            lock_ttl: Duration::from_millis(config.lock_ttl_ms),
            lock_retry: Duration::from_millis(config.lock_retry_ms),
            lock_attempts: config.lock_attempts,
            max_queue_len,
        }
    }
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self::from_config(&RedisConfig::default(), 100)
    }
}

/// 持有中的分布式锁
struct HeldLock {
    key: String,
    token: String,
}

/// Redis 存储
///
/// 读-改-写序列在 `lock:{key}` 分布式锁内执行；锁用随机令牌标识，
/// 释放时通过 Lua 脚本比较令牌后删除，避免误删他人持有的锁。
pub struct RedisStore {
    conn: ConnectionManager,
    config: RedisStoreConfig,
    release_script: redis::Script,
}

fn store_error(e: redis::RedisError) -> HookcastError {
    HookcastError::Store(e.to_string())
}

/// PTTL 返回 -1 表示没有过期时间，-2 表示键不存在
fn ttl_from_pttl(pttl: i64) -> Option<Duration> {
    if pttl >= 0 {
        Some(Duration::from_millis(pttl as u64))
    } else {
        None
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    ttl.as_millis().clamp(1, u64::MAX as u128) as u64
}

impl RedisStore {
    pub async fn connect(config: RedisStoreConfig) -> HookcastResult<Self> {
        info!("Connecting redis store at {}", config.url);
        let client = redis::Client::open(config.url.clone()).map_err(store_error)?;
        let mut conn = client.get_connection_manager().await.map_err(store_error)?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;

        info!("Redis store connected, key prefix '{}'", config.key_prefix);
        Ok(Self {
            conn,
            config,
            release_script: redis::Script::new(RELEASE_LOCK_SCRIPT),
        })
    }

    pub fn config(&self) -> &RedisStoreConfig {
        &self.config
    }

    fn full_key(&self, key: &str) -> String {
        namespaced(&self.config.key_prefix, key)
    }

    fn lock_key(&self, key: &str) -> String {
        namespaced(&self.config.key_prefix, &format!("lock:{key}"))
    }

    async fn acquire(&self, conn: &mut ConnectionManager, key: &str) -> HookcastResult<HeldLock> {
        let lock_key = self.lock_key(key);
        let token = Uuid::new_v4().to_string();
        let ttl_ms = ttl_millis(self.config.lock_ttl);

        for attempt in 0..self.config.lock_attempts {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(&lock_key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(ttl_ms)
                .query_async(conn)
                .await
                .map_err(store_error)?;
            if acquired.is_some() {
                if attempt > 0 {
                    debug!(key = %lock_key, "Lock acquired after {} retries", attempt);
                }
                return Ok(HeldLock {
                    key: lock_key,
                    token,
                });
            }
            tokio::time::sleep(self.config.lock_retry).await;
        }

        Err(HookcastError::Store(format!(
            "获取锁失败: {lock_key}，已重试 {} 次",
            self.config.lock_attempts
        )))
    }

    async fn release(&self, conn: &mut ConnectionManager, lock: HeldLock) {
        let released: Result<i64, _> = self
            .release_script
            .key(&lock.key)
            .arg(&lock.token)
            .invoke_async(conn)
            .await;
        match released {
            Ok(1) => {}
            Ok(_) => warn!(key = %lock.key, "Lock expired before release"),
            Err(e) => warn!(key = %lock.key, "Failed to release lock: {}", e),
        }
    }

    async fn pttl(conn: &mut ConnectionManager, key: &str) -> HookcastResult<i64> {
        redis::cmd("PTTL")
            .arg(key)
            .query_async(conn)
            .await
            .map_err(store_error)
    }

    async fn set_if_absent_locked(
        conn: &mut ConnectionManager,
        key: &str,
        encoded: String,
        ttl: Duration,
    ) -> HookcastResult<SetOutcome> {
        let exists: bool = redis::cmd("EXISTS")
            .arg(key)
            .query_async(conn)
            .await
            .map_err(store_error)?;
        if exists {
            let pttl = Self::pttl(conn, key).await?;
            return Ok(SetOutcome::Exists {
                ttl_remaining: ttl_from_pttl(pttl),
            });
        }
        Self::write(conn, key, encoded, ttl).await?;
        Ok(SetOutcome::Created)
    }

    async fn write(conn: &mut ConnectionManager, key: &str, encoded: String, ttl: Duration) -> HookcastResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(encoded);
        if !ttl.is_zero() {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let _: () = cmd.query_async(conn).await.map_err(store_error)?;
        Ok(())
    }

    async fn update_locked(conn: &mut ConnectionManager, key: &str, encoded: String) -> HookcastResult<bool> {
        let exists: bool = redis::cmd("EXISTS")
            .arg(key)
            .query_async(conn)
            .await
            .map_err(store_error)?;
        if !exists {
            return Ok(false);
        }
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(encoded)
            .arg("KEEPTTL")
            .query_async(conn)
            .await
            .map_err(store_error)?;
        Ok(true)
    }

    async fn enqueue_locked(
        &self,
        conn: &mut ConnectionManager,
        key: &str,
        encoded: String,
        ttl: Duration,
    ) -> HookcastResult<usize> {
        let cap = self.config.max_queue_len.max(1);
        let length: usize = redis::cmd("RPUSH")
            .arg(key)
            .arg(encoded)
            .query_async(conn)
            .await
            .map_err(store_error)?;

        if length > cap {
            let _: () = redis::cmd("LTRIM")
                .arg(key)
                .arg(-(cap as i64))
                .arg(-1)
                .query_async(conn)
                .await
                .map_err(store_error)?;
            warn!(key = %key, "Queue exceeded {} entries, dropped {} oldest", cap, length - cap);
        }

        if ttl.is_zero() {
            let _: bool = redis::cmd("PERSIST")
                .arg(key)
                .query_async(conn)
                .await
                .map_err(store_error)?;
        } else {
            let _: bool = redis::cmd("PEXPIRE")
                .arg(key)
                .arg(ttl_millis(ttl))
                .query_async(conn)
                .await
                .map_err(store_error)?;
        }
        Ok(length.min(cap))
    }

    async fn dequeue_all_locked(conn: &mut ConnectionManager, key: &str) -> HookcastResult<Option<QueuedValues>> {
        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(-1)
            .query_async(conn)
            .await
            .map_err(store_error)?;
        if raw.is_empty() {
            return Ok(None);
        }
        let pttl = Self::pttl(conn, key).await?;
        let _: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(conn)
            .await
            .map_err(store_error)?;

        let values = raw
            .iter()
            .map(|item| serde_json::from_str(item))
            .collect::<Result<Vec<Value>, _>>()?;
        Ok(Some(QueuedValues {
            values,
            ttl_remaining: ttl_from_pttl(pttl),
        }))
    }
}

fn namespaced(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}:{key}")
    }
}

#[async_trait]
impl Store for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> HookcastResult<Option<StoredValue>> {
        let mut conn = self.conn.clone();
        let full = self.full_key(key);
        let raw: Option<String> = redis::cmd("GET")
            .arg(&full)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let pttl = Self::pttl(&mut conn, &full).await?;
        Ok(Some(StoredValue {
            value: serde_json::from_str(&raw)?,
            ttl_remaining: ttl_from_pttl(pttl),
        }))
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> HookcastResult<bool> {
        let mut conn = self.conn.clone();
        Self::write(&mut conn, &self.full_key(key), serde_json::to_string(&value)?, ttl).await?;
        Ok(true)
    }

    #[instrument(skip(self, value))]
    async fn set_if_absent(&self, key: &str, value: Value, ttl: Duration) -> HookcastResult<SetOutcome> {
        let encoded = serde_json::to_string(&value)?;
        let mut conn = self.conn.clone();
        let lock = self.acquire(&mut conn, key).await?;
        let result = Self::set_if_absent_locked(&mut conn, &self.full_key(key), encoded, ttl).await;
        self.release(&mut conn, lock).await;
        result
    }

    #[instrument(skip(self, value))]
    async fn update(&self, key: &str, value: Value) -> HookcastResult<bool> {
        let encoded = serde_json::to_string(&value)?;
        let mut conn = self.conn.clone();
        let lock = self.acquire(&mut conn, key).await?;
        let result = Self::update_locked(&mut conn, &self.full_key(key), encoded).await;
        self.release(&mut conn, lock).await;
        result
    }

    #[instrument(skip(self))]
    async fn remove(&self, key: &str) -> HookcastResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL")
            .arg(self.full_key(key))
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(removed > 0)
    }

    #[instrument(skip(self, value))]
    async fn enqueue(&self, key: &str, value: Value, ttl: Duration) -> HookcastResult<usize> {
        let encoded = serde_json::to_string(&value)?;
        let mut conn = self.conn.clone();
        let lock = self.acquire(&mut conn, key).await?;
        let result = self
            .enqueue_locked(&mut conn, &self.full_key(key), encoded, ttl)
            .await;
        self.release(&mut conn, lock).await;
        result
    }

    #[instrument(skip(self))]
    async fn dequeue_all(&self, key: &str) -> HookcastResult<Option<QueuedValues>> {
        let mut conn = self.conn.clone();
        let lock = self.acquire(&mut conn, key).await?;
        let result = Self::dequeue_all_locked(&mut conn, &self.full_key(key)).await;
        self.release(&mut conn, lock).await;
        result
    }
}

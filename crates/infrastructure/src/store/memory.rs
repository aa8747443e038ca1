use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use hookcast_core::traits::{QueuedValues, SetOutcome, Store, StoredValue};
use hookcast_core::HookcastResult;

/// 进程内存储配置
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// 后台清扫间隔，为零时不启动清扫任务
    pub sweep_interval: Duration,
    /// 单个队列的最大长度，超出时丢弃最旧的条目
    pub max_queue_len: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_millis(1000),
            max_queue_len: 100,
        }
    }
}

#[derive(Debug)]
enum Slot {
    Single(Value),
    Queue(VecDeque<Value>),
}

#[derive(Debug)]
struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
    seq: u64,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }

    fn ttl_remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at.map(|at| at.saturating_duration_since(now))
    }
}

/// 条目和过期索引由同一把锁保护
#[derive(Debug, Default)]
struct StoreState {
    entries: HashMap<String, Entry>,
    expiry: BTreeMap<(Instant, u64), String>,
    next_seq: u64,
}

impl StoreState {
    fn live(&self, key: &str, now: Instant) -> Option<&Entry> {
        self.entries.get(key).filter(|entry| entry.is_live(now))
    }

    fn live_mut(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        self.entries.get_mut(key).filter(|entry| entry.is_live(now))
    }

    fn insert(&mut self, key: &str, slot: Slot, ttl: Duration, now: Instant) {
        self.remove(key);
        let seq = self.next_seq;
        self.next_seq += 1;
        let expires_at = if ttl.is_zero() { None } else { Some(now + ttl) };
        if let Some(at) = expires_at {
            self.expiry.insert((at, seq), key.to_string());
        }
        self.entries.insert(key.to_string(), Entry { slot, expires_at, seq });
    }

    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        if let Some(at) = entry.expires_at {
            self.expiry.remove(&(at, entry.seq));
        }
        Some(entry)
    }

    fn sweep(&mut self, now: Instant) -> usize {
        let mut evicted = 0;
        while let Some((&(at, seq), _)) = self.expiry.first_key_value() {
            if at > now {
                break;
            }
            if let Some(((_, _), key)) = self.expiry.pop_first() {
                if self.entries.get(&key).is_some_and(|entry| entry.seq == seq) {
                    self.entries.remove(&key);
                    evicted += 1;
                }
            }
        }
        evicted
    }
}

/// 进程内存储
///
/// 所有前台操作和后台清扫都通过同一把互斥锁串行化。过期但尚未清扫的
/// 条目对读取不可见。
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    config: MemoryStoreConfig,
    shutdown_tx: std::sync::Mutex<Option<oneshot::Sender<()>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    /// 在 tokio 运行时中创建时会启动后台清扫任务
    pub fn with_config(config: MemoryStoreConfig) -> Self {
        let state = Arc::new(Mutex::new(StoreState::default()));
        let shutdown_tx = Self::start_sweeper(Arc::downgrade(&state), config.sweep_interval);
        Self {
            state,
            config,
            shutdown_tx: std::sync::Mutex::new(shutdown_tx),
        }
    }

    fn start_sweeper(
        state: Weak<Mutex<StoreState>>,
        sweep_interval: Duration,
    ) -> Option<oneshot::Sender<()>> {
        if sweep_interval.is_zero() {
            return None;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No tokio runtime available, memory store sweeper not started");
            return None;
        };

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        runtime.spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(state) = state.upgrade() else {
                            break;
                        };
                        let evicted = state.lock().await.sweep(Instant::now());
                        if evicted > 0 {
                            debug!("Memory store sweeper evicted {} entries", evicted);
                            counter!("hookcast_store_swept_total").increment(evicted as u64);
                        }
                    }
                    // 发送端被丢弃时同样会触发
                    _ = &mut shutdown_rx => break,
                }
            }
            info!("Memory store sweeper stopped");
        });
        Some(shutdown_tx)
    }

    pub fn config(&self) -> &MemoryStoreConfig {
        &self.config
    }

    /// 立即清扫过期条目，返回清除的数量
    pub async fn sweep(&self) -> usize {
        let evicted = self.state.lock().await.sweep(Instant::now());
        if evicted > 0 {
            counter!("hookcast_store_swept_total").increment(evicted as u64);
        }
        evicted
    }

    /// 包括过期但尚未清扫的条目
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.shutdown_tx.lock() {
            if let Some(tx) = guard.take() {
                let _ = tx.send(());
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> HookcastResult<Option<StoredValue>> {
        let now = Instant::now();
        let state = self.state.lock().await;
        Ok(state.live(key, now).map(|entry| StoredValue {
            value: match &entry.slot {
                Slot::Single(value) => value.clone(),
                Slot::Queue(values) => Value::Array(values.iter().cloned().collect()),
            },
            ttl_remaining: entry.ttl_remaining(now),
        }))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> HookcastResult<bool> {
        let now = Instant::now();
        self.state
            .lock()
            .await
            .insert(key, Slot::Single(value), ttl, now);
        Ok(true)
    }

    #[instrument(skip(self, value))]
    async fn set_if_absent(&self, key: &str, value: Value, ttl: Duration) -> HookcastResult<SetOutcome> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        if let Some(entry) = state.live(key, now) {
            return Ok(SetOutcome::Exists {
                ttl_remaining: entry.ttl_remaining(now),
            });
        }
        state.insert(key, Slot::Single(value), ttl, now);
        Ok(SetOutcome::Created)
    }

    async fn update(&self, key: &str, value: Value) -> HookcastResult<bool> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        match state.live_mut(key, now) {
            Some(entry) => {
                entry.slot = Slot::Single(value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, key: &str) -> HookcastResult<bool> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        Ok(state.remove(key).is_some_and(|entry| entry.is_live(now)))
    }

    #[instrument(skip(self, value))]
    async fn enqueue(&self, key: &str, value: Value, ttl: Duration) -> HookcastResult<usize> {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        let mut queue = match state.remove(key) {
            Some(Entry {
                slot: Slot::Queue(queue),
                expires_at,
                ..
            }) if expires_at.map_or(true, |at| at > now) => queue,
            _ => VecDeque::new(),
        };
        queue.push_back(value);

        let cap = self.config.max_queue_len.max(1);
        if queue.len() > cap {
            let dropped = queue.len() - cap;
            queue.drain(..dropped);
            warn!(key = %key, "Queue exceeded {} entries, dropped {} oldest", cap, dropped);
        }

        let length = queue.len();
        state.insert(key, Slot::Queue(queue), ttl, now);
        Ok(length)
    }

    #[instrument(skip(self))]
    async fn dequeue_all(&self, key: &str) -> HookcastResult<Option<QueuedValues>> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let Some(entry) = state.remove(key) else {
            return Ok(None);
        };
        if !entry.is_live(now) {
            return Ok(None);
        }

        let ttl_remaining = entry.ttl_remaining(now);
        let values = match entry.slot {
            Slot::Queue(queue) => queue.into_iter().collect(),
            Slot::Single(value) => vec![value],
        };
        Ok(Some(QueuedValues {
            values,
            ttl_remaining,
        }))
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

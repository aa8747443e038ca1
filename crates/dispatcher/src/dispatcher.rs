use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use metrics::{counter, histogram};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use hookcast_core::{DispatchError, Destination, HookcastError, HookcastResult, IncomingEvent, Store};

use crate::delayer::Delayer;
use crate::retry_policy::RetryPolicy;
use crate::sender_registry::SenderRegistry;
use crate::throttler::{attach_queued, Throttler};
use crate::tracker::TaskTracker;

pub const THROTTLE_PREFIX: &str = "throttle";
pub const QUEUE_SUFFIX: &str = "queue";
/// 分发器默认保留的最近错误条数
pub const DEFAULT_ERROR_CAPACITY: usize = 1024;

/// 一次分发调用的结果
///
/// `accepted` 只表示事件通过了校验、目标任务已经启动。
/// `errors` 只包含本次调用的目标在返回前已经产生的错误，
/// 之后的失败通过 [`Dispatcher::errors`] 观察。
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub accepted: bool,
    pub launched: usize,
    pub errors: Vec<DispatchError>,
}

/// 单次分发调用自己的错误收集
type CallErrors = Arc<Mutex<Vec<DispatchError>>>;

/// 单个目标任务的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Sent,
    Throttled,
}

/// 扇出分发器
///
/// 每个目标一个受跟踪的任务；调用在所有任务启动后立即返回。
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    throttler: Throttler,
    delayer: Delayer,
    senders: SenderRegistry,
    tracker: TaskTracker,
    retry_policy: RetryPolicy,
    /// 所有调用共享的最近错误，超出容量时丢弃最旧的
    errors: Mutex<VecDeque<DispatchError>>,
    error_capacity: usize,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, senders: SenderRegistry) -> Self {
        Self::with_parts(
            store,
            senders,
            TaskTracker::new(),
            RetryPolicy::default(),
            DEFAULT_ERROR_CAPACITY,
        )
    }

    pub fn with_parts(
        store: Arc<dyn Store>,
        senders: SenderRegistry,
        tracker: TaskTracker,
        retry_policy: RetryPolicy,
        error_capacity: usize,
    ) -> Self {
        let error_capacity = error_capacity.max(1);
        Self {
            inner: Arc::new(DispatcherInner {
                throttler: Throttler::new(store),
                delayer: Delayer::new(tracker.clone()),
                senders,
                tracker,
                retry_policy,
                errors: Mutex::new(VecDeque::with_capacity(error_capacity.min(64))),
                error_capacity,
            }),
        }
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.inner.tracker
    }

    pub fn senders(&self) -> &SenderRegistry {
        &self.inner.senders
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry_policy
    }

    /// 发送方重新提交失败事件前应等待的时间
    pub fn retry_after(&self, event: &IncomingEvent, destination: &Destination) -> Duration {
        self.inner.retry_policy.backoff(destination.config(), &event.control)
    }

    /// 校验事件后为每个目标启动一个任务
    pub async fn dispatch(&self, event: IncomingEvent, destinations: Vec<Destination>) -> DispatchOutcome {
        if let Err(e) = event.validate() {
            warn!(event_key = %event.event_key, "拒绝无效事件: {}", e);
            return DispatchOutcome {
                accepted: false,
                launched: 0,
                errors: vec![DispatchError::execution(e.to_string())],
            };
        }

        let call_errors: CallErrors = Arc::new(Mutex::new(Vec::new()));
        let launched = destinations.len();
        for destination in destinations {
            let this = self.clone();
            let event = event.clone();
            let call_errors = Arc::clone(&call_errors);
            self.inner.tracker.spawn(async move {
                this.run_destination(event, destination, false, call_errors).await
            });
        }
        debug!(event_key = %event.event_key, "已启动 {} 个目标任务", launched);

        let errors = call_errors.lock().await.clone();
        DispatchOutcome {
            accepted: true,
            launched,
            errors,
        }
    }

    /// 最近错误的快照，按发生顺序
    pub async fn errors(&self) -> Vec<DispatchError> {
        self.inner.errors.lock().await.iter().cloned().collect()
    }

    /// 取出并清空最近错误
    pub async fn take_errors(&self) -> Vec<DispatchError> {
        self.inner.errors.lock().await.drain(..).collect()
    }

    pub async fn error_count(&self) -> usize {
        self.inner.errors.lock().await.len()
    }

    pub fn error_capacity(&self) -> usize {
        self.inner.error_capacity
    }

    pub fn in_flight(&self) -> usize {
        self.inner.tracker.in_flight()
    }

    pub async fn drain(&self) {
        self.inner.tracker.drain().await
    }

    pub async fn drain_timeout(&self, timeout: Duration) -> bool {
        self.inner.tracker.drain_timeout(timeout).await
    }

    // 尾随任务会递归启动本方法，需要装箱
    fn run_destination(
        &self,
        event: IncomingEvent,
        destination: Destination,
        trailing: bool,
        call_errors: CallErrors,
    ) -> BoxFuture<'static, ()> {
        let this = self.clone();
        async move {
            let result = this
                .process(event.clone(), &destination, trailing, &call_errors)
                .await;
            this.record(&event, &destination, result, &call_errors).await;
        }
        .boxed()
    }

    async fn process(
        &self,
        mut event: IncomingEvent,
        destination: &Destination,
        trailing: bool,
        call_errors: &CallErrors,
    ) -> HookcastResult<Delivery> {
        let period = destination.config().throttle_period();
        if !period.is_zero() {
            let throttler = &self.inner.throttler;
            let store = throttler.store();
            let key = store.data_key(&event, destination, THROTTLE_PREFIX, "");
            let queue_key = store.data_key(&event, destination, THROTTLE_PREFIX, QUEUE_SUFFIX);

            let decision = throttler.can_trigger(&key, period).await?;
            if !decision.allowed {
                // 存储的剩余时间可能被截断，窗口未结束时尾随任务顺延
                if trailing {
                    self.schedule_trailing(
                        event,
                        destination.clone(),
                        decision.ttl_remaining,
                        Arc::clone(call_errors),
                    );
                    return Ok(Delivery::Throttled);
                }
                let length = throttler.queue_suppressed(&queue_key, &event, period).await?;
                if length == 1 && destination.config().throttle_trailing {
                    self.schedule_trailing(
                        event,
                        destination.clone(),
                        decision.ttl_remaining,
                        Arc::clone(call_errors),
                    );
                }
                return Ok(Delivery::Throttled);
            }

            let mut entries = throttler.drain_queued(&queue_key).await?;
            if trailing {
                // 积压已被其他放行的触发取走并发送，尾随任务不再重复发送
                let Some(latest) = entries.pop() else {
                    throttler.store().remove(&key).await?;
                    debug!(
                        event_key = %event.event_key,
                        destination = %destination.name(),
                        "积压已被取走，跳过尾随分发"
                    );
                    return Ok(Delivery::Throttled);
                };
                event.payload = latest.payload;
                event.target_document = latest.document;
            }
            attach_queued(&mut event, entries);
        }

        let sender = self.inner.senders.resolve(&destination.config().sender)?;
        let send_event = event.clone();
        let send_destination = destination.clone();
        self.inner
            .delayer
            .execute(&event, destination, move || async move {
                let started = Instant::now();
                let result = sender.send_event(&send_event, &send_destination).await;
                histogram!("hookcast_send_duration_ms").record(started.elapsed().as_millis() as f64);
                result
            })
            .await?;

        Ok(Delivery::Sent)
    }

    fn schedule_trailing(
        &self,
        event: IncomingEvent,
        destination: Destination,
        wait: Duration,
        call_errors: CallErrors,
    ) {
        let wait = wait.max(Duration::from_millis(1));
        debug!(
            event_key = %event.event_key,
            destination = %destination.name(),
            "{:?} 后执行尾随分发",
            wait
        );
        let this = self.clone();
        self.inner.tracker.spawn(async move {
            tokio::time::sleep(wait).await;
            this.run_destination(event, destination, true, call_errors).await;
        });
    }

    async fn record(
        &self,
        event: &IncomingEvent,
        destination: &Destination,
        result: HookcastResult<Delivery>,
        call_errors: &CallErrors,
    ) {
        let name = destination.name().to_string();
        match result {
            Ok(Delivery::Sent) => {
                info!(
                    event_key = %event.event_key,
                    destination = %name,
                    trace_id = event.trace_id.as_deref().unwrap_or(""),
                    "事件已发送"
                );
                counter!("hookcast_dispatch_total", "destination" => name, "outcome" => "sent")
                    .increment(1);
            }
            Ok(Delivery::Throttled) => {
                debug!(event_key = %event.event_key, destination = %name, "事件被节流");
                counter!("hookcast_dispatch_total", "destination" => name, "outcome" => "throttled")
                    .increment(1);
            }
            Err(e) => {
                let dispatch_error = to_dispatch_error(event, destination, e);
                let outcome = if dispatch_error.is_retryable() {
                    error!(
                        event_key = %event.event_key,
                        destination = %name,
                        trace_id = event.trace_id.as_deref().unwrap_or(""),
                        retry_after_secs = self.retry_after(event, destination).as_secs(),
                        "分发失败: {}",
                        dispatch_error
                    );
                    "failed"
                } else {
                    error!(
                        event_key = %event.event_key,
                        destination = %name,
                        trace_id = event.trace_id.as_deref().unwrap_or(""),
                        "分发失败，不可重试: {}",
                        dispatch_error
                    );
                    "unretryable"
                };
                counter!("hookcast_dispatch_total", "destination" => name, "outcome" => outcome)
                    .increment(1);
                call_errors.lock().await.push(dispatch_error.clone());
                self.retain_error(dispatch_error).await;
            }
        }
    }

    async fn retain_error(&self, error: DispatchError) {
        let mut errors = self.inner.errors.lock().await;
        if errors.len() >= self.inner.error_capacity {
            errors.pop_front();
            counter!("hookcast_errors_evicted_total").increment(1);
        }
        errors.push_back(error);
    }
}

fn to_dispatch_error(event: &IncomingEvent, destination: &Destination, error: HookcastError) -> DispatchError {
    match error {
        HookcastError::Unretryable(message) => DispatchError::Unretryable {
            event_key: event.event_key.clone(),
            destination: destination.name().to_string(),
            message,
        },
        other => DispatchError::Dispatcher {
            event_key: event.event_key.clone(),
            destination: destination.name().to_string(),
            trace_id: event.trace_id.clone(),
            message: other.to_string(),
        },
    }
}

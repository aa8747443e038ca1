//! 事件分发流水线
//!
//! 控制器把事件映射到订阅的目标，经过滤器链和中间件后交给分发器。
//! 分发器为每个目标启动一个受跟踪的任务，依次执行节流、延迟和发送。

pub mod controller;
pub mod delayer;
pub mod dispatcher;
pub mod filters;
pub mod mapper;
pub mod middleware;
pub mod retry_policy;
pub mod sender_registry;
pub mod throttler;
pub mod tracker;

pub use controller::{DispatchReceipt, EventController};
pub use delayer::{effective_delay, require_delay, Delayer};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use filters::{
    DesiredHookFilter, DestinationFilter, EnvironmentFilter, FilterChain, SourceFilter,
    ValidationFilter,
};
pub use mapper::ConfigurationMapper;
pub use middleware::{LoggingMiddleware, Middleware, TraceIdMiddleware};
pub use retry_policy::{retry_backoff, RetryPolicy, DEFAULT_RETRY_BACKOFF};
pub use sender_registry::SenderRegistry;
pub use throttler::{ThrottleDecision, ThrottledEntry, Throttler};
pub use tracker::TaskTracker;

use tracing::info;
use uuid::Uuid;

use hookcast_core::{Destination, IncomingEvent};

/// 过滤之后、分发之前的后处理钩子
///
/// 中间件可以修改事件或缩减目标列表，但不能引入过滤结果之外的目标，
/// 控制器会按名称把输出与过滤结果取交集。
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, event: &mut IncomingEvent, destinations: Vec<Destination>) -> Vec<Destination>;
}

/// 为缺少追踪ID的事件生成一个
pub struct TraceIdMiddleware;

impl Middleware for TraceIdMiddleware {
    fn name(&self) -> &str {
        "trace_id"
    }

    fn apply(&self, event: &mut IncomingEvent, destinations: Vec<Destination>) -> Vec<Destination> {
        if event.trace_id.as_deref().map_or(true, str::is_empty) {
            event.trace_id = Some(Uuid::new_v4().to_string());
        }
        destinations
    }
}

pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    fn apply(&self, event: &mut IncomingEvent, destinations: Vec<Destination>) -> Vec<Destination> {
        let names: Vec<&str> = destinations.iter().map(|d| d.name()).collect();
        info!(
            event_key = %event.event_key,
            trace_id = event.trace_id.as_deref().unwrap_or(""),
            "事件将分发到 {} 个目标: {:?}",
            names.len(),
            names
        );
        destinations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookcast_core::Configuration;
    use std::sync::Arc;

    #[test]
    fn test_trace_id_is_assigned_once() {
        let mut event = IncomingEvent::new("product.update", "core");
        let destinations = vec![Destination::new(Arc::new(Configuration::new("search")))];

        let kept = TraceIdMiddleware.apply(&mut event, destinations);
        assert_eq!(kept.len(), 1);
        let assigned = event.trace_id.clone().unwrap();
        assert!(Uuid::parse_str(&assigned).is_ok());

        TraceIdMiddleware.apply(&mut event, Vec::new());
        assert_eq!(event.trace_id.as_deref(), Some(assigned.as_str()));
    }

    #[test]
    fn test_existing_trace_id_is_kept() {
        let mut event = IncomingEvent::new("product.update", "core").with_trace_id("upstream-1");
        TraceIdMiddleware.apply(&mut event, Vec::new());
        assert_eq!(event.trace_id.as_deref(), Some("upstream-1"));
    }
}

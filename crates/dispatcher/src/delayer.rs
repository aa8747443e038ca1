use std::future::Future;
use std::time::Duration;

use tracing::debug;

use hookcast_core::{Destination, HookcastError, HookcastResult, IncomingEvent};

use crate::tracker::TaskTracker;

/// 计算有效等待时间：配置的延迟减去上游已经等待的时间，最小为零
pub fn effective_delay(event: &IncomingEvent, destination: &Destination) -> Duration {
    let configured = destination.config().delay_period();
    if configured.is_zero() {
        return Duration::ZERO;
    }

    let outstanding = event
        .control
        .outstanding_delay_seconds
        .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
        .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
        .unwrap_or(Duration::ZERO);

    configured.saturating_sub(outstanding)
}

/// 配置了延迟且仍有剩余等待时间
pub fn require_delay(event: &IncomingEvent, destination: &Destination) -> bool {
    !effective_delay(event, destination).is_zero()
}

/// 延迟执行器
///
/// 等待在一个受跟踪的子任务中完成，调用方等待子任务结束后才返回，
/// 因此延迟期间该目标同时计入两个进行中任务。
#[derive(Debug, Clone)]
pub struct Delayer {
    tracker: TaskTracker,
}

impl Delayer {
    pub fn new(tracker: TaskTracker) -> Self {
        Self { tracker }
    }

    pub async fn execute<F, Fut, T>(
        &self,
        event: &IncomingEvent,
        destination: &Destination,
        action: F,
    ) -> HookcastResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = HookcastResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let wait = effective_delay(event, destination);
        if wait.is_zero() {
            return action().await;
        }

        debug!(
            event_key = %event.event_key,
            destination = %destination.name(),
            "延迟 {:?} 后执行",
            wait
        );
        let handle = self.tracker.spawn(async move {
            tokio::time::sleep(wait).await;
            action().await
        });

        handle
            .await
            .map_err(|e| HookcastError::Internal(format!("延迟任务异常结束: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookcast_core::{Configuration, ControlParams};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn delayed_destination(delay: Duration) -> Destination {
        Destination::new(Arc::new(Configuration::new("search").with_delay(delay)))
    }

    fn event_with_outstanding(seconds: Option<f64>) -> IncomingEvent {
        let mut control = ControlParams::default();
        if let Some(seconds) = seconds {
            control = control.with_outstanding_delay_seconds(seconds);
        }
        IncomingEvent::new("product.update", "core")
            .with_target_id("product_id")
            .with_control(control)
    }

    #[test]
    fn test_outstanding_delay_is_subtracted() {
        let destination = delayed_destination(Duration::from_secs(10));

        let fully_consumed = event_with_outstanding(Some(10.0));
        assert_eq!(effective_delay(&fully_consumed, &destination), Duration::ZERO);
        assert!(!require_delay(&fully_consumed, &destination));

        let absent = event_with_outstanding(None);
        assert_eq!(effective_delay(&absent, &destination), Duration::from_secs(10));

        let zero = event_with_outstanding(Some(0.0));
        assert!(require_delay(&zero, &destination));
        assert_eq!(effective_delay(&zero, &destination), Duration::from_secs(10));

        let partial = event_with_outstanding(Some(2.5));
        assert_eq!(effective_delay(&partial, &destination), Duration::from_millis(7500));

        let overshoot = event_with_outstanding(Some(60.0));
        assert_eq!(effective_delay(&overshoot, &destination), Duration::ZERO);
    }

    #[test]
    fn test_bogus_outstanding_values_are_ignored() {
        let destination = delayed_destination(Duration::from_secs(10));
        for seconds in [-5.0, f64::NAN, f64::INFINITY] {
            let event = event_with_outstanding(Some(seconds));
            assert_eq!(effective_delay(&event, &destination), Duration::from_secs(10));
        }
    }

    #[test]
    fn test_no_configured_delay() {
        let destination = Destination::new(Arc::new(Configuration::new("search")));
        let event = event_with_outstanding(Some(3.0));
        assert_eq!(effective_delay(&event, &destination), Duration::ZERO);
        assert!(!require_delay(&event, &destination));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_waits_effective_delay() {
        let tracker = TaskTracker::new();
        let delayer = Delayer::new(tracker.clone());
        let destination = delayed_destination(Duration::from_secs(10));
        let event = event_with_outstanding(None);

        let started = Instant::now();
        let value = delayer
            .execute(&event, &destination, || async { Ok::<_, HookcastError>(42) })
            .await
            .unwrap();

        assert_eq!(value, 42);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_millis(10_010));
        assert!(tracker.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_runs_immediately_when_consumed_upstream() {
        let delayer = Delayer::new(TaskTracker::new());
        let destination = delayed_destination(Duration::from_secs(10));
        let event = event_with_outstanding(Some(10.0));

        let started = Instant::now();
        delayer
            .execute(&event, &destination, || async { Ok::<_, HookcastError>(()) })
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_subtask_is_tracked() {
        let tracker = TaskTracker::new();
        let delayer = Delayer::new(tracker.clone());
        let destination = delayed_destination(Duration::from_secs(5));
        let event = event_with_outstanding(None);

        let waiting = tokio::spawn(async move {
            delayer
                .execute(&event, &destination, || async { Ok::<_, HookcastError>(()) })
                .await
        });
        tokio::task::yield_now().await;
        assert_eq!(tracker.in_flight(), 1);

        waiting.await.unwrap().unwrap();
        assert!(tracker.is_idle());
    }
}

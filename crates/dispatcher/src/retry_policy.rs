use std::time::Duration;

use hookcast_core::{Configuration, ControlParams};

/// 未配置退避档位时使用的退避时间
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// 按重试次数取退避档位，超过最后一档时停留在最后一档
pub fn retry_backoff(config: &Configuration, control: &ControlParams) -> Duration {
    RetryPolicy::default().backoff(config, control)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    default_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            default_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn new(default_backoff: Duration) -> Self {
        Self { default_backoff }
    }

    pub fn default_backoff(&self) -> Duration {
        self.default_backoff
    }

    pub fn backoff(&self, config: &Configuration, control: &ControlParams) -> Duration {
        let tiers = &config.retry_backoff;
        if tiers.is_empty() {
            return self.default_backoff;
        }
        let index = (control.retry_count() as usize).min(tiers.len() - 1);
        tiers[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiered() -> Configuration {
        Configuration::new("search").with_retry_backoff(vec![
            Duration::from_secs(5),
            Duration::from_secs(30),
            Duration::from_secs(200),
            Duration::from_secs(600),
        ])
    }

    #[test]
    fn test_tiers_clamp_at_last() {
        let config = tiered();
        let expected = [(0, 5), (2, 200), (4, 600), (100, 600)];
        for (retry, seconds) in expected {
            let control = ControlParams::default().with_retry_count(retry);
            assert_eq!(
                retry_backoff(&config, &control),
                Duration::from_secs(seconds),
                "retry_count={retry}"
            );
        }
    }

    #[test]
    fn test_missing_retry_count_uses_first_tier() {
        assert_eq!(
            retry_backoff(&tiered(), &ControlParams::default()),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_default_when_no_tiers() {
        let config = Configuration::new("search");
        let control = ControlParams::default().with_retry_count(3);
        assert_eq!(retry_backoff(&config, &control), DEFAULT_RETRY_BACKOFF);

        let policy = RetryPolicy::new(Duration::from_secs(12));
        assert_eq!(policy.backoff(&config, &control), Duration::from_secs(12));
    }
}

use std::time::Duration;

/// Default time an entry with no subscribers survives before eviction.
pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(5 * 60);

/// Default base delay between query retries. Doubled on each attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Process-wide cache settings, applied to queries that do not override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long fetched data counts as fresh. Zero means a new subscription
    /// always triggers a background refetch.
    pub stale_time: Duration,
    /// Idle window after the last subscriber leaves before an entry is dropped.
    pub gc_time: Duration,
    /// Retries after a failed fetch. Zero disables retrying.
    pub retry: u32,
    pub retry_delay: Duration,
    /// Whether `QueryClient::on_focus` refetches stale active entries.
    pub refetch_on_focus: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::ZERO,
            gc_time: DEFAULT_GC_TIME,
            retry: 0,
            retry_delay: DEFAULT_RETRY_DELAY,
            refetch_on_focus: true,
        }
    }
}

/// Per-query overrides. Unset fields fall back to the `CacheConfig`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub enabled: bool,
    pub stale_time: Option<Duration>,
    pub retry: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub refetch_interval: Option<Duration>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }
}

/// Resolved retry policy for a single fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn resolve(options: &QueryOptions, config: &CacheConfig) -> Self {
        Self {
            retries: options.retry.unwrap_or(config.retry),
            base_delay: options.retry_delay.unwrap_or(config.retry_delay),
        }
    }

    /// Exponential backoff: base, 2x base, 4x base, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_falls_back_to_config() {
        let config = CacheConfig {
            retry: 2,
            ..CacheConfig::default()
        };
        let policy = RetryPolicy::resolve(&QueryOptions::new(), &config);
        assert_eq!(policy.retries, 2);
        assert_eq!(policy.base_delay, DEFAULT_RETRY_DELAY);

        let options = QueryOptions {
            retry: Some(5),
            ..QueryOptions::new()
        };
        assert_eq!(RetryPolicy::resolve(&options, &config).retries, 5);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            retries: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }
}

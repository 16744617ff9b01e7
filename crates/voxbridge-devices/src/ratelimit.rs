//! Proactive-notification rate limiting.
//!
//! Voice-assistant clouds budget proactive updates per skill; the scarce
//! resource is the quota, not delivery. Rejected notifications are dropped
//! silently, never queued or retried.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use voxbridge_core::{MAX_CHANGES_PER_HOUR, RATE_WINDOW};

/// Rolling-window counter of emitted change notifications per key.
///
/// Constructor-injected into the [`DeviceManager`](crate::DeviceManager)
/// so tests can run with independent instances and tight limits.
pub struct RateLimiter {
    max_per_window: usize,
    window: Duration,
    entries: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_per_window: usize, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record a notification for `key` if under the limit.
    pub async fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now()).await
    }

    /// Same as [`allow`](Self::allow) with an explicit clock, for tests.
    ///
    /// Stale timestamps are pruned before the count is checked, so entries
    /// older than the window never count against the limit.
    pub async fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut entries = self.entries.lock().await;
        let stamps = entries.entry(key.to_string()).or_default();
        stamps.retain(|t| now.saturating_duration_since(*t) < self.window);
        if stamps.len() >= self.max_per_window {
            debug!(key, count = stamps.len(), "change notification rate limited");
            return false;
        }
        stamps.push(now);
        true
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(MAX_CHANGES_PER_HOUR, RATE_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_limit_enforced_within_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(3600));
        let now = Instant::now();
        for _ in 0..3 {
            assert!(limiter.allow_at("dim.1", now).await);
        }
        assert!(!limiter.allow_at("dim.1", now).await);
        // Other keys keep their own budget.
        assert!(limiter.allow_at("dim.2", now).await);
    }

    #[tokio::test]
    async fn test_window_elapse_frees_budget() {
        let limiter = RateLimiter::new(2, Duration::from_secs(3600));
        let start = Instant::now();
        assert!(limiter.allow_at("th.1", start).await);
        assert!(limiter.allow_at("th.1", start).await);
        assert!(!limiter.allow_at("th.1", start).await);

        let later = start + Duration::from_secs(3601);
        assert!(limiter.allow_at("th.1", later).await);
    }

    #[tokio::test]
    async fn test_prune_before_check() {
        // One stale entry plus max-1 fresh ones must still admit a new one.
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.allow_at("k", start).await);
        let fresh = start + Duration::from_secs(59);
        assert!(limiter.allow_at("k", fresh).await);
        let after = start + Duration::from_secs(61);
        assert!(limiter.allow_at("k", after).await);
    }
}

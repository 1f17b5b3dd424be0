//! Fixed-window counter limiter.

use std::sync::Arc;
use std::time::Duration;

use dealflow_core::domain::QuotaSnapshot;
use dealflow_core::ports::{CounterStore, StoreError};

use crate::config::WindowQuota;

/// Result of counting one request against a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOutcome {
    pub allowed: bool,
    pub count: u64,
    pub snapshot: QuotaSnapshot,
}

/// Counts requests in fixed windows with one atomic increment per request.
///
/// The first increment creates the counter with the window as TTL. A request
/// is admitted iff the post-increment count is within the quota; rejected
/// requests stay counted.
#[derive(Clone)]
pub struct WindowLimiter {
    store: Arc<dyn CounterStore>,
}

impl WindowLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    pub async fn hit(&self, key: &str, quota: &WindowQuota) -> Result<WindowOutcome, StoreError> {
        let counter = self.store.incr(key, 1, quota.window).await?;
        let count = counter.value.max(0) as u64;

        Ok(WindowOutcome {
            allowed: count <= quota.max_requests,
            count,
            snapshot: QuotaSnapshot {
                limit: quota.max_requests,
                remaining: quota.max_requests.saturating_sub(count),
                reset_after: counter.ttl.unwrap_or(quota.window),
            },
        })
    }

    /// Take back one counted request. Never re-creates an expired window.
    pub async fn refund(&self, key: &str, window: Duration) -> Result<(), StoreError> {
        self.store.incr(key, -1, window).await?;
        Ok(())
    }

    /// Current count and remaining lifetime, without counting.
    pub async fn peek(&self, key: &str) -> Result<Option<(u64, Option<Duration>)>, StoreError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        let count = raw
            .parse::<i64>()
            .map_err(|e| StoreError::Serialization(format!("counter '{}': {}", key, e)))?;
        let ttl = self.store.ttl(key).await?;
        Ok(Some((count.max(0) as u64, ttl)))
    }
}

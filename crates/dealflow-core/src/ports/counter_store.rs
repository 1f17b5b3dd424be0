//! Shared counter store port.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{BucketOutcome, BucketSpec};

/// Counter store trait - abstraction over the key-value store shared by every
/// service instance (Redis, in-memory).
///
/// Patterns passed to [`CounterStore::delete_by_pattern`] use Redis glob
/// syntax: `*`, `?` and backslash escapes. Use [`escape_pattern`] for literal
/// fragments.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Backend name for logs and health output.
    fn backend(&self) -> &'static str;

    /// Check the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Get a plain value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set a plain value with optional TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Atomically add `by` to a counter and return the new value.
    ///
    /// A missing counter is created with `ttl`. A negative delta never creates
    /// a counter: on a missing key it returns a zero value with no TTL.
    async fn incr(&self, key: &str, by: i64, ttl: Duration) -> Result<Counter, StoreError>;

    /// Delete a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Delete every key matching `pattern`. Returns how many were removed.
    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, StoreError>;

    async fn set_add(&self, set_key: &str, member: &str) -> Result<(), StoreError>;

    async fn set_remove(&self, set_key: &str, member: &str) -> Result<(), StoreError>;

    async fn set_is_member(&self, set_key: &str, member: &str) -> Result<bool, StoreError>;

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>, StoreError>;

    /// Remaining lifetime of a key; `None` if the key is missing or persistent.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Refill and consume one token from a bucket as a single atomic step.
    async fn take_token(&self, key: &str, spec: &BucketSpec) -> Result<BucketOutcome, StoreError>;
}

/// Value of a counter right after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    pub value: i64,
    pub ttl: Option<Duration>,
}

/// Counter store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Operation '{op}' timed out after {timeout:?}")]
    Timeout { op: &'static str, timeout: Duration },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

/// Escape glob metacharacters so `raw` matches only itself.
pub fn escape_pattern(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

//! In-memory counter store - used for development, single-instance
//! deployments, tests, and as the fallback when Redis is unreachable at boot.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use dealflow_core::domain::{BucketOutcome, BucketSpec, TokenBucketState};
use dealflow_core::ports::{Counter, CounterStore, StoreError};

enum Value {
    Text(String),
    Set(HashSet<String>),
    Bucket(TokenBucketState),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }
}

/// In-memory counter store using a HashMap behind an async RwLock.
///
/// Every mutation holds the write lock for its whole read-modify-write, which
/// gives the same per-key atomicity the Redis scripts give. TTLs follow the
/// tokio clock, so tests can drive expiry with `tokio::time::advance`.
/// Expired entries are purged by the write paths at most once per
/// [`SWEEP_INTERVAL`], so keys that are never touched again do not pile up.
/// Note: state is per-process and lost on restart.
pub struct InMemoryCounterStore {
    store: RwLock<HashMap<String, Entry>>,
    epoch: Instant,
    last_sweep_ms: AtomicU64,
}

/// Minimum spacing between two full purges of expired entries.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self {
            store: RwLock::new(HashMap::new()),
            epoch: Instant::now(),
            last_sweep_ms: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Drop every expired entry if the last purge is older than
    /// [`SWEEP_INTERVAL`]. Callers hold the write lock.
    fn sweep_if_due(&self, store: &mut HashMap<String, Entry>) {
        let now_ms = self.now_ms();
        let last = self.last_sweep_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) < SWEEP_INTERVAL.as_millis() as u64 {
            return;
        }
        self.last_sweep_ms.store(now_ms, Ordering::Relaxed);

        let now = Instant::now();
        let before = store.len();
        store.retain(|_, entry| !entry.is_expired(now));
        let purged = before - store.len();
        if purged > 0 {
            tracing::debug!(purged, remaining = store.len(), "Purged expired counters");
        }
    }

    fn wrong_type(key: &str) -> StoreError {
        StoreError::Backend(format!(
            "WRONGTYPE operation against key '{}' holding the wrong kind of value",
            key
        ))
    }

    /// Drop `key` if it has expired, then return the live entry.
    fn live<'a>(store: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
        let now = Instant::now();
        if store.get(key).is_some_and(|entry| entry.is_expired(now)) {
            store.remove(key);
        }
        store.get_mut(key)
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let store = self.store.read().await;
        match store.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => Ok(None),
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => Err(Self::wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut store = self.store.write().await;
        self.sweep_if_due(&mut store);
        store.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str, by: i64, ttl: Duration) -> Result<Counter, StoreError> {
        let mut store = self.store.write().await;
        self.sweep_if_due(&mut store);
        let now = Instant::now();

        let Some(entry) = Self::live(&mut store, key) else {
            if by < 0 {
                return Ok(Counter {
                    value: 0,
                    ttl: None,
                });
            }
            store.insert(
                key.to_string(),
                Entry {
                    value: Value::Text(by.to_string()),
                    expires_at: Some(now + ttl),
                },
            );
            return Ok(Counter {
                value: by,
                ttl: Some(ttl),
            });
        };

        let Value::Text(text) = &mut entry.value else {
            return Err(Self::wrong_type(key));
        };
        let current: i64 = text.parse().map_err(|_| {
            StoreError::Backend(format!("value at '{}' is not an integer", key))
        })?;
        let value = current + by;
        *text = value.to_string();

        if entry.expires_at.is_none() && by > 0 {
            entry.expires_at = Some(now + ttl);
        }

        Ok(Counter {
            value,
            ttl: entry.expires_at.map(|exp| exp.saturating_duration_since(now)),
        })
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut store = self.store.write().await;
        Ok(store
            .remove(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now())))
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, StoreError> {
        let mut store = self.store.write().await;
        let now = Instant::now();

        let matching: Vec<String> = store
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();

        let mut removed = 0;
        for key in matching {
            if let Some(entry) = store.remove(&key) {
                if !entry.is_expired(now) {
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }

    async fn set_add(&self, set_key: &str, member: &str) -> Result<(), StoreError> {
        let mut store = self.store.write().await;
        self.sweep_if_due(&mut store);

        match Self::live(&mut store, set_key) {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => {
                members.insert(member.to_string());
            }
            Some(_) => return Err(Self::wrong_type(set_key)),
            None => {
                store.insert(
                    set_key.to_string(),
                    Entry {
                        value: Value::Set(HashSet::from([member.to_string()])),
                        expires_at: None,
                    },
                );
            }
        }

        Ok(())
    }

    async fn set_remove(&self, set_key: &str, member: &str) -> Result<(), StoreError> {
        let mut store = self.store.write().await;

        let now_empty = match Self::live(&mut store, set_key) {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => {
                members.remove(member);
                members.is_empty()
            }
            Some(_) => return Err(Self::wrong_type(set_key)),
            None => false,
        };

        // Empty sets do not exist, as in Redis.
        if now_empty {
            store.remove(set_key);
        }

        Ok(())
    }

    async fn set_is_member(&self, set_key: &str, member: &str) -> Result<bool, StoreError> {
        let store = self.store.read().await;
        match store.get(set_key) {
            Some(entry) if entry.is_expired(Instant::now()) => Ok(false),
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(members.contains(member)),
            Some(_) => Err(Self::wrong_type(set_key)),
            None => Ok(false),
        }
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>, StoreError> {
        let store = self.store.read().await;
        match store.get(set_key) {
            Some(entry) if entry.is_expired(Instant::now()) => Ok(Vec::new()),
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => {
                let mut members: Vec<String> = members.iter().cloned().collect();
                members.sort();
                Ok(members)
            }
            Some(_) => Err(Self::wrong_type(set_key)),
            None => Ok(Vec::new()),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let store = self.store.read().await;
        let now = Instant::now();
        Ok(store
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.expires_at)
            .map(|exp| exp.saturating_duration_since(now)))
    }

    async fn take_token(&self, key: &str, spec: &BucketSpec) -> Result<BucketOutcome, StoreError> {
        let mut store = self.store.write().await;
        self.sweep_if_due(&mut store);
        let now_ms = self.now_ms();

        let mut state = match Self::live(&mut store, key) {
            Some(Entry {
                value: Value::Bucket(state),
                ..
            }) => *state,
            Some(_) => return Err(Self::wrong_type(key)),
            None => TokenBucketState::fresh(spec, now_ms),
        };

        let outcome = state.take(spec, now_ms);

        store.insert(
            key.to_string(),
            Entry {
                value: Value::Bucket(state),
                expires_at: Some(Instant::now() + spec.idle_ttl()),
            },
        );

        Ok(outcome)
    }
}

/// Match `text` against a Redis-style glob supporting `*`, `?` and `\` escapes.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    // Position of the last `*` seen and the text index it is currently absorbing up to.
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    star = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '\\' if pi + 1 < p.len() => {
                    if p[pi + 1] == t[ti] {
                        pi += 2;
                        ti += 1;
                        continue;
                    }
                }
                c if c == t[ti] => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                _ => {}
            }
        }

        match star {
            Some((sp, st)) => {
                pi = sp + 1;
                ti = st + 1;
                star = Some((sp, st + 1));
            }
            None => return false,
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

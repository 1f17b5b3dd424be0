//! Token-bucket arithmetic.
//!
//! Stores execute this as one atomic step per request; the Redis store mirrors
//! it in a server-side script.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketSpec {
    /// Tokens a bucket starts with when it does not exist yet.
    pub initial_tokens: f64,
    pub max_tokens: f64,
    pub refill_per_sec: f64,
}

impl BucketSpec {
    /// How long an idle bucket is kept.
    ///
    /// Twice the time to refill an empty bucket; after that the state carries
    /// no information a fresh bucket would not.
    pub fn idle_ttl(&self) -> Duration {
        let secs = if self.refill_per_sec > 0.0 {
            (self.max_tokens / self.refill_per_sec).ceil() * 2.0
        } else {
            3600.0
        };
        Duration::from_secs((secs as u64).max(1))
    }
}

/// Persisted state of a single bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenBucketState {
    pub tokens: f64,
    /// Milliseconds on the store's clock.
    pub last_refill_ms: u64,
}

impl TokenBucketState {
    pub fn fresh(spec: &BucketSpec, now_ms: u64) -> Self {
        Self {
            tokens: spec.initial_tokens.min(spec.max_tokens).max(0.0),
            last_refill_ms: now_ms,
        }
    }

    /// Add the tokens earned since the last refill, capped at `max_tokens`.
    ///
    /// A clock that went backwards adds nothing.
    pub fn refill(&mut self, spec: &BucketSpec, now_ms: u64) {
        let elapsed_secs = now_ms.saturating_sub(self.last_refill_ms) as f64 / 1000.0;
        self.tokens = (self.tokens + elapsed_secs * spec.refill_per_sec)
            .min(spec.max_tokens)
            .max(0.0);
        self.last_refill_ms = self.last_refill_ms.max(now_ms);
    }

    /// Refill, then consume one token if available.
    pub fn take(&mut self, spec: &BucketSpec, now_ms: u64) -> BucketOutcome {
        self.refill(spec, now_ms);
        let allowed = self.tokens >= 1.0;
        if allowed {
            self.tokens -= 1.0;
        }
        BucketOutcome {
            allowed,
            tokens: self.tokens,
        }
    }
}

/// Result of one atomic refill-and-consume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketOutcome {
    pub allowed: bool,
    /// Tokens left after the attempt.
    pub tokens: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> BucketSpec {
        BucketSpec {
            initial_tokens: 10.0,
            max_tokens: 20.0,
            refill_per_sec: 1.0,
        }
    }

    #[test]
    fn test_fresh_bucket_starts_at_initial() {
        let state = TokenBucketState::fresh(&spec(), 1_000);
        assert_eq!(state.tokens, 10.0);
    }

    #[test]
    fn test_refill_is_capped() {
        let spec = spec();
        for t in [0u64, 1, 5, 19, 20, 21, 3600] {
            let mut state = TokenBucketState {
                tokens: 0.0,
                last_refill_ms: 0,
            };
            state.refill(&spec, t * 1000);
            assert_eq!(state.tokens, (t as f64).min(20.0), "after {}s", t);
        }
    }

    #[test]
    fn test_take_until_empty() {
        let spec = spec();
        let mut state = TokenBucketState::fresh(&spec, 0);
        for _ in 0..10 {
            assert!(state.take(&spec, 0).allowed);
        }
        let outcome = state.take(&spec, 0);
        assert!(!outcome.allowed);
        assert_eq!(outcome.tokens, 0.0);

        // Half a second is not enough for a whole token.
        assert!(!state.take(&spec, 500).allowed);
        assert!(state.take(&spec, 1_000).allowed);
    }

    #[test]
    fn test_clock_skew_adds_nothing() {
        let spec = spec();
        let mut state = TokenBucketState {
            tokens: 3.0,
            last_refill_ms: 10_000,
        };
        state.refill(&spec, 5_000);
        assert_eq!(state.tokens, 3.0);
        assert_eq!(state.last_refill_ms, 10_000);
    }

    #[test]
    fn test_idle_ttl() {
        assert_eq!(spec().idle_ttl(), Duration::from_secs(40));
    }
}

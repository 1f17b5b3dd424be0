use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::key::Identifier;

/// Reason recorded when escalation blocks a caller.
pub const REPEATED_VIOLATIONS_REASON: &str = "Repeated rate limit violations.";

/// An active block on a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl BlockRecord {
    pub fn new(reason: impl Into<String>, duration: std::time::Duration) -> Self {
        let now = Utc::now();
        let expires_at = TimeDelta::from_std(duration)
            .ok()
            .and_then(|span| now.checked_add_signed(span))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            reason: reason.into(),
            blocked_at: now,
            expires_at,
        }
    }
}

/// An administrative exemption from every admission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub added_at: DateTime<Utc>,
    /// `None` means permanent.
    pub expires_at: Option<DateTime<Utc>>,
}

impl WhitelistEntry {
    pub fn new(duration: Option<std::time::Duration>) -> Self {
        let now = Utc::now();
        let expires_at = duration.map(|d| {
            TimeDelta::from_std(d)
                .ok()
                .and_then(|span| now.checked_add_signed(span))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        });
        Self {
            added_at: now,
            expires_at,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.expires_at.is_none()
    }
}

/// A window counter currently alive for a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveLimit {
    /// Rendered scope, e.g. `tier:pro`.
    pub scope: String,
    pub count: u64,
    pub limit: u64,
    pub reset_after_secs: Option<u64>,
}

/// Everything the admission layer knows about one caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    pub identifier: Identifier,
    pub blocked: bool,
    pub block: Option<BlockRecord>,
    pub whitelisted: bool,
    pub whitelist: Option<WhitelistEntry>,
    pub violations: u64,
    pub active_limits: Vec<ActiveLimit>,
}

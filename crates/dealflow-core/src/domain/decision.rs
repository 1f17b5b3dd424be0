//! Admission decisions handed back to the HTTP layer.

use std::time::Duration;

use serde::Serialize;

use super::key::Scope;

/// Stable numeric codes carried by rejections.
pub mod codes {
    pub const ENDPOINT_LIMIT_EXCEEDED: u16 = 4291;
    pub const GLOBAL_LIMIT_EXCEEDED: u16 = 4292;
    pub const TIER_LIMIT_EXCEEDED: u16 = 4293;
    pub const BURST_LIMIT_EXCEEDED: u16 = 4294;
    pub const CALLER_BLOCKED: u16 = 4031;
}

/// Quota position reported in `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaSnapshot {
    pub limit: u64,
    pub remaining: u64,
    pub reset_after: Duration,
}

impl QuotaSnapshot {
    /// Keep whichever snapshot leaves the caller less headroom.
    pub fn tighter(self, other: QuotaSnapshot) -> QuotaSnapshot {
        if other.remaining < self.remaining {
            other
        } else {
            self
        }
    }
}

/// Why a request was turned away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    QuotaExceeded { scope: Scope },
    BurstExceeded,
    Blocked,
}

/// A user-facing rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub reason: RejectionReason,
    pub http_status: u16,
    pub code: u16,
    pub message: String,
    /// Absent for blocked callers: the block length is not disclosed.
    pub retry_after_secs: Option<u64>,
    pub quota: Option<QuotaSnapshot>,
}

impl Rejection {
    pub fn quota_exceeded(scope: Scope, quota: QuotaSnapshot, retry_after_secs: u64) -> Self {
        let (code, message) = match &scope {
            Scope::Endpoint(_) => (
                codes::ENDPOINT_LIMIT_EXCEEDED,
                "Too many requests to this endpoint, please try again later.",
            ),
            Scope::Global => (
                codes::GLOBAL_LIMIT_EXCEEDED,
                "Too many requests, please try again later.",
            ),
            Scope::Tier(_) => (
                codes::TIER_LIMIT_EXCEEDED,
                "Request quota for your plan exceeded, please try again later.",
            ),
        };

        Self {
            reason: RejectionReason::QuotaExceeded { scope },
            http_status: 429,
            code,
            message: message.to_string(),
            retry_after_secs: Some(retry_after_secs.max(1)),
            quota: Some(quota),
        }
    }

    pub fn burst_exceeded(retry_after_secs: u64) -> Self {
        Self {
            reason: RejectionReason::BurstExceeded,
            http_status: 429,
            code: codes::BURST_LIMIT_EXCEEDED,
            message: "Too many requests in a short period, please slow down.".to_string(),
            retry_after_secs: Some(retry_after_secs.max(1)),
            quota: None,
        }
    }

    pub fn blocked() -> Self {
        Self {
            reason: RejectionReason::Blocked,
            http_status: 403,
            code: codes::CALLER_BLOCKED,
            message: "Access temporarily suspended due to repeated rate limit violations."
                .to_string(),
            retry_after_secs: None,
            quota: None,
        }
    }
}

/// An admitted request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Admission {
    pub quota: Option<QuotaSnapshot>,
    /// Admitted by a whitelist entry without any quota evaluation.
    pub bypassed: bool,
    /// Store keys to un-count if the request ends up succeeding.
    pub refund_on_success: Vec<String>,
}

impl Admission {
    pub fn bypass() -> Self {
        Self {
            bypassed: true,
            ..Self::default()
        }
    }
}

/// Outcome of running a request through the admission pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Admit(Admission),
    Reject(Rejection),
}

impl AdmissionDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionDecision::Admit(_))
    }
}

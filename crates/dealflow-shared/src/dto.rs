//! Data Transfer Objects for the rate-limit admin API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `PUT /admin/rate-limits/{key}/whitelist`. No duration means
/// permanent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhitelistRequest {
    #[serde(default)]
    pub duration_seconds: Option<u64>,
}

/// Body of `PUT /admin/rate-limits/{key}/block`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRequest {
    pub duration_seconds: u64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WhitelistResponse {
    pub key: String,
    pub added_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub permanent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockResponse {
    pub key: String,
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResetResponse {
    pub key: String,
    pub windows_cleared: u64,
    pub violations_cleared: bool,
    pub block_cleared: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveLimitResponse {
    pub scope: String,
    pub count: u64,
    pub limit: u64,
    pub reset_after_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitStatusResponse {
    pub key: String,
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<BlockResponse>,
    pub whitelisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whitelist: Option<WhitelistResponse>,
    pub violations: u64,
    pub active_limits: Vec<ActiveLimitResponse>,
}

/// Response of `GET /admin/rate-limits`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitListResponse {
    pub whitelisted: Vec<WhitelistResponse>,
    pub blocked: Vec<BlockResponse>,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: StoreHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreHealth {
    pub backend: String,
    pub reachable: bool,
}

//! # Dealflow Infrastructure
//!
//! Concrete implementations of the ports defined in `dealflow-core`.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external services, in-memory counter store only
//! - `auth` - JWT token validation
//! - `redis` - Redis-backed shared counter store

pub mod store;

#[cfg(feature = "auth")]
pub mod auth;

// Re-exports - In-Memory
pub use store::InMemoryCounterStore;

#[cfg(feature = "auth")]
pub use auth::{JwtConfig, JwtTokenService};

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use store::{RedisConfig, RedisCounterStore};

//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod auth;
mod counter_store;

pub use auth::{AuthError, TokenClaims, TokenService, TokenSubject};
pub use counter_store::{Counter, CounterStore, StoreError, escape_pattern};

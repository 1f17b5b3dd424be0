//! Domain-level error types.

use thiserror::Error;

/// Domain errors - invalid input reaching the admission domain.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid rate limit key: {0}")]
    InvalidKey(String),
}

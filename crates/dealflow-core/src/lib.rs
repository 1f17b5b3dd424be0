//! # Dealflow Core
//!
//! The domain layer of the admission-control subsystem.
//! This crate contains caller identities, rate-limit keys, admission decisions
//! and the ports the infrastructure must implement. It has no infrastructure
//! dependencies.

pub mod domain;
pub mod env;
pub mod error;
pub mod ports;

pub use error::DomainError;

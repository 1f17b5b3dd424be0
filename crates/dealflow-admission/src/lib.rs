//! # Dealflow Admission
//!
//! Multi-strategy rate limiting over a shared [`CounterStore`]:
//! block/whitelist overrides, fixed windows at the endpoint, global and tier
//! layers, a token-bucket burst gate, and violation tracking that escalates
//! repeat offenders to a timed block.
//!
//! Build one [`AdmissionPipeline`] at startup and share it.
//!
//! [`CounterStore`]: dealflow_core::ports::CounterStore

pub mod burst;
pub mod config;
pub mod keys;
pub mod pipeline;
pub mod registry;
pub mod request;
pub mod tier;
pub mod violations;
pub mod window;

pub use config::{
    AdmissionConfig, BurstConfig, ConfigError, EndpointOverride, EscalationConfig, EscalationStep,
    TierConfig, WindowQuota,
};
pub use keys::{KeyResolver, KeySpace};
pub use pipeline::{AdmissionError, AdmissionPipeline, ResetOutcome};
pub use request::AdmissionRequest;
pub use tier::TierClassifier;

//! Application state - shared across all handlers.

use std::sync::Arc;

use dealflow_admission::AdmissionPipeline;
use dealflow_core::ports::{CounterStore, StoreError, TokenService};
use dealflow_infra::{InMemoryCounterStore, JwtTokenService};

#[cfg(feature = "redis")]
use dealflow_infra::RedisCounterStore;

use crate::config::AppConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AdmissionPipeline>,
    pub tokens: Arc<dyn TokenService>,
}

impl AppState {
    /// Build the application state with appropriate implementations.
    pub async fn new(config: &AppConfig) -> Result<Self, StoreError> {
        let store = Self::counter_store(config).await?;
        let pipeline = Arc::new(AdmissionPipeline::new(config.admission.clone(), store));
        let tokens: Arc<dyn TokenService> = Arc::new(JwtTokenService::new(config.jwt.clone()));

        tracing::info!(
            backend = pipeline.store().backend(),
            enabled = pipeline.config().enabled,
            "Application state initialized"
        );

        Ok(Self { pipeline, tokens })
    }

    #[cfg(feature = "redis")]
    async fn counter_store(config: &AppConfig) -> Result<Arc<dyn CounterStore>, StoreError> {
        match RedisCounterStore::new(config.redis.clone()).await {
            Ok(store) => Ok(Arc::new(store)),
            Err(e) if config.redis.fallback_to_memory => {
                tracing::error!(
                    error = %e,
                    "Failed to connect to Redis. Falling back to the in-memory counter store; \
                     quotas are no longer shared between instances."
                );
                Ok(Arc::new(InMemoryCounterStore::new()))
            }
            Err(e) => Err(e),
        }
    }

    #[cfg(not(feature = "redis"))]
    async fn counter_store(_config: &AppConfig) -> Result<Arc<dyn CounterStore>, StoreError> {
        tracing::info!("Running without redis feature - using in-memory counter store");
        Ok(Arc::new(InMemoryCounterStore::new()))
    }
}

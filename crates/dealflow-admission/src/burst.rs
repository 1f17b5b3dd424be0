//! Token-bucket burst limiter.

use std::sync::Arc;

use dealflow_core::domain::{BucketOutcome, BucketSpec};
use dealflow_core::ports::{CounterStore, StoreError};

/// Last gate of the pipeline. Refill and consume happen in one store call.
#[derive(Clone)]
pub struct BurstLimiter {
    store: Arc<dyn CounterStore>,
    spec: BucketSpec,
}

impl BurstLimiter {
    pub fn new(store: Arc<dyn CounterStore>, spec: BucketSpec) -> Self {
        Self { store, spec }
    }

    pub async fn take(&self, key: &str) -> Result<BucketOutcome, StoreError> {
        self.store.take_token(key, &self.spec).await
    }
}

//! Violation tracking and progressive escalation.

use std::sync::Arc;

use dealflow_core::ports::{CounterStore, StoreError};

use crate::config::EscalationConfig;

/// Where a violation count sits on the escalation staircase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Below the first threshold.
    None,
    /// Past a non-final threshold; retry hints are scaled by the multiplier.
    Penalty(u32),
    /// Final threshold reached.
    Block,
}

impl Escalation {
    pub fn multiplier(&self) -> u32 {
        match self {
            Escalation::None | Escalation::Block => 1,
            Escalation::Penalty(multiplier) => *multiplier,
        }
    }
}

/// Counts rejections per identifier within a rolling window.
#[derive(Clone)]
pub struct ViolationTracker {
    store: Arc<dyn CounterStore>,
    config: EscalationConfig,
}

impl ViolationTracker {
    pub fn new(store: Arc<dyn CounterStore>, config: EscalationConfig) -> Self {
        Self { store, config }
    }

    /// Record one violation and return the new count.
    pub async fn record(&self, key: &str) -> Result<u64, StoreError> {
        let counter = self
            .store
            .incr(key, 1, self.config.violation_window)
            .await?;
        Ok(counter.value.max(0) as u64)
    }

    pub async fn count(&self, key: &str) -> Result<u64, StoreError> {
        match self.store.get(key).await? {
            Some(raw) => raw
                .parse::<i64>()
                .map(|v| v.max(0) as u64)
                .map_err(|e| StoreError::Serialization(format!("violations '{}': {}", key, e))),
            None => Ok(0),
        }
    }

    /// Staircase position for a count. Monotonic in `count`.
    pub fn escalation(&self, count: u64) -> Escalation {
        let Some(last) = self.config.steps.last() else {
            return Escalation::None;
        };
        if count >= last.threshold {
            return Escalation::Block;
        }

        self.config
            .steps
            .iter()
            .take_while(|step| count >= step.threshold)
            .last()
            .map_or(Escalation::None, |step| {
                Escalation::Penalty(step.penalty_multiplier)
            })
    }
}

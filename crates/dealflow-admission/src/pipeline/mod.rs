//! The admission pipeline.
//!
//! Stages run in a fixed order and stop at the first rejection:
//!
//! 1. whitelist (admit, skip everything else)
//! 2. block list (reject)
//! 3. endpoint window, when the route has an override
//! 4. global window
//! 5. tier window
//! 6. burst bucket
//!
//! A rejection from stages 3-6 records a violation and walks the escalation
//! staircase. Any store error inside a stage is logged and the stage passes.

use std::sync::Arc;
use std::time::Duration;

use dealflow_core::domain::{
    ActiveLimit, Admission, AdmissionDecision, BlockRecord, Identifier, REPEATED_VIOLATIONS_REASON,
    RateLimitKey, RateLimitStatus, Rejection, Scope, WhitelistEntry,
};
use dealflow_core::ports::{CounterStore, StoreError};

use crate::burst::BurstLimiter;
use crate::config::{AdmissionConfig, WindowQuota};
use crate::keys::{KeyResolver, KeySpace};
use crate::registry::AccessRegistry;
use crate::request::AdmissionRequest;
use crate::tier::TierClassifier;
use crate::violations::{Escalation, ViolationTracker};
use crate::window::WindowLimiter;

#[cfg(test)]
mod tests;

/// Errors from administrative operations. Request admission never fails; it
/// fails open instead.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("Counter store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Keys removed by an administrative reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResetOutcome {
    pub windows_cleared: u64,
    pub violations_cleared: bool,
    pub block_cleared: bool,
    pub bucket_cleared: bool,
}

/// One window layer evaluated for a request.
struct Layer {
    scope: Scope,
    quota: WindowQuota,
    skip_successful: bool,
}

/// Admission control for one service instance.
///
/// Built once at startup from an immutable configuration and shared by every
/// worker. All contested state lives in the counter store.
pub struct AdmissionPipeline {
    config: Arc<AdmissionConfig>,
    store: Arc<dyn CounterStore>,
    keys: KeySpace,
    resolver: KeyResolver,
    classifier: TierClassifier,
    windows: WindowLimiter,
    burst: BurstLimiter,
    violations: ViolationTracker,
    registry: AccessRegistry,
}

impl AdmissionPipeline {
    pub fn new(config: AdmissionConfig, store: Arc<dyn CounterStore>) -> Self {
        let keys = KeySpace::new(config.key_prefix.clone());

        Self {
            resolver: KeyResolver,
            classifier: TierClassifier::new(config.tiers.clone()),
            windows: WindowLimiter::new(store.clone()),
            burst: BurstLimiter::new(store.clone(), config.burst.spec()),
            violations: ViolationTracker::new(store.clone(), config.escalation.clone()),
            registry: AccessRegistry::new(store.clone(), keys.clone()),
            keys,
            store,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// Decide whether a request may proceed.
    pub async fn check(&self, request: &AdmissionRequest) -> AdmissionDecision {
        if !self.config.enabled {
            return AdmissionDecision::Admit(Admission::bypass());
        }

        let identifier = self.resolver.resolve(request);

        match self.registry.is_whitelisted(&identifier).await {
            Ok(true) => {
                tracing::debug!(key = %identifier, "Whitelisted caller, skipping admission");
                return AdmissionDecision::Admit(Admission::bypass());
            }
            Ok(false) => {}
            Err(e) => fail_open("whitelist", &identifier, &e),
        }

        match self.registry.is_blocked(&identifier).await {
            Ok(true) => {
                tracing::info!(key = %identifier, "Rejected blocked caller");
                return AdmissionDecision::Reject(Rejection::blocked());
            }
            Ok(false) => {}
            Err(e) => fail_open("block", &identifier, &e),
        }

        let tier = self.classifier.classify(&request.caller);
        let mut admission = Admission::default();

        for layer in self.layers(request, &tier) {
            let key = self
                .keys
                .window(&RateLimitKey::new(layer.scope.clone(), identifier.clone()));

            let outcome = match self.windows.hit(&key, &layer.quota).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    fail_open(layer.scope.label(), &identifier, &e);
                    continue;
                }
            };

            if !outcome.allowed {
                tracing::info!(
                    key = %identifier,
                    scope = %layer.scope,
                    tier = %tier,
                    count = outcome.count,
                    limit = layer.quota.max_requests,
                    "Window limit exceeded"
                );
                let multiplier = self.record_violation(&identifier).await;
                let retry_after = ceil_secs(outcome.snapshot.reset_after)
                    .saturating_mul(u64::from(multiplier));
                return AdmissionDecision::Reject(Rejection::quota_exceeded(
                    layer.scope,
                    outcome.snapshot,
                    retry_after,
                ));
            }

            if layer.skip_successful {
                admission.refund_on_success.push(key);
            }
            admission.quota = Some(match admission.quota {
                Some(current) => current.tighter(outcome.snapshot),
                None => outcome.snapshot,
            });
        }

        if self.config.burst.enabled {
            match self.burst.take(&self.keys.bucket(&identifier)).await {
                Ok(outcome) if !outcome.allowed => {
                    tracing::info!(key = %identifier, tier = %tier, "Burst limit exceeded");
                    let multiplier = self.record_violation(&identifier).await;
                    return AdmissionDecision::Reject(Rejection::burst_exceeded(u64::from(
                        multiplier,
                    )));
                }
                Ok(_) => {}
                Err(e) => fail_open("burst", &identifier, &e),
            }
        }

        AdmissionDecision::Admit(admission)
    }

    /// Settle an admitted request once its response status is known.
    ///
    /// Un-counts `skip_successful` windows when the status is below 400.
    pub async fn settle(&self, admission: &Admission, status: u16) {
        if status >= 400 {
            return;
        }
        for key in &admission.refund_on_success {
            // The window length only matters on creation, which refunds never do.
            if let Err(e) = self.windows.refund(key, self.config.global.window).await {
                tracing::warn!(key = %key, error = %e, "Failed to refund successful request");
            }
        }
    }

    fn layers(&self, request: &AdmissionRequest, tier: &str) -> Vec<Layer> {
        let mut layers = Vec::with_capacity(3);

        if let Some(endpoint) = self.config.endpoint_override(&request.method, &request.path) {
            layers.push(Layer {
                scope: endpoint.scope(),
                quota: endpoint.quota,
                skip_successful: endpoint.skip_successful,
            });
        }
        layers.push(Layer {
            scope: Scope::Global,
            quota: self.config.global,
            skip_successful: false,
        });
        layers.push(Layer {
            scope: Scope::Tier(tier.to_string()),
            quota: WindowQuota {
                window: self.config.global.window,
                max_requests: self.config.tier_quota(tier),
            },
            skip_successful: false,
        });

        layers
    }

    /// Record a violation and escalate. Returns the retry-after multiplier.
    async fn record_violation(&self, identifier: &Identifier) -> u32 {
        let count = match self
            .violations
            .record(&self.keys.violations(identifier))
            .await
        {
            Ok(count) => count,
            Err(e) => {
                fail_open("violations", identifier, &e);
                return 1;
            }
        };

        let escalation = self.violations.escalation(count);
        if escalation == Escalation::Block {
            let duration = self.config.escalation.block_duration;
            match self
                .registry
                .block(identifier, REPEATED_VIOLATIONS_REASON, duration)
                .await
            {
                Ok(_) => tracing::warn!(
                    key = %identifier,
                    violations = count,
                    block_secs = duration.as_secs(),
                    "Caller blocked after repeated violations"
                ),
                Err(e) => fail_open("escalation", identifier, &e),
            }
        }
        escalation.multiplier()
    }

    pub async fn whitelist_add(
        &self,
        identifier: &Identifier,
        duration: Option<Duration>,
    ) -> Result<WhitelistEntry, AdmissionError> {
        if duration.is_some_and(|d| d.is_zero()) {
            return Err(AdmissionError::InvalidRequest(
                "whitelist duration must be positive".to_string(),
            ));
        }
        let entry = self.registry.whitelist_add(identifier, duration).await?;
        tracing::info!(key = %identifier, expires_at = ?entry.expires_at, "Caller whitelisted");
        Ok(entry)
    }

    pub async fn whitelist_remove(&self, identifier: &Identifier) -> Result<bool, AdmissionError> {
        let removed = self.registry.whitelist_remove(identifier).await?;
        tracing::info!(key = %identifier, removed, "Caller removed from whitelist");
        Ok(removed)
    }

    /// Block a caller by hand.
    pub async fn block(
        &self,
        identifier: &Identifier,
        duration: Duration,
        reason: &str,
    ) -> Result<BlockRecord, AdmissionError> {
        if duration.is_zero() {
            return Err(AdmissionError::InvalidRequest(
                "block duration must be positive".to_string(),
            ));
        }
        let record = self.registry.block(identifier, reason, duration).await?;
        tracing::warn!(key = %identifier, reason, expires_at = %record.expires_at, "Caller blocked");
        Ok(record)
    }

    /// Clear violations, the block, every window counter and the bucket of a
    /// caller. The whitelist is left alone.
    pub async fn reset(&self, identifier: &Identifier) -> Result<ResetOutcome, AdmissionError> {
        let windows_cleared = self
            .store
            .delete_by_pattern(&self.keys.window_pattern(identifier))
            .await?;
        let violations_cleared = self
            .store
            .delete(&self.keys.violations(identifier))
            .await?;
        let block_cleared = self.registry.unblock(identifier).await?;
        let bucket_cleared = self.store.delete(&self.keys.bucket(identifier)).await?;

        let outcome = ResetOutcome {
            windows_cleared,
            violations_cleared,
            block_cleared,
            bucket_cleared,
        };
        tracing::info!(key = %identifier, ?outcome, "Rate limits reset");
        Ok(outcome)
    }

    /// Current standing of a caller.
    ///
    /// Active limits are found by probing every configured scope rather than
    /// scanning the keyspace.
    pub async fn status(&self, identifier: &Identifier) -> Result<RateLimitStatus, AdmissionError> {
        let block = self.registry.block_record(identifier).await?;
        let whitelist = self.registry.whitelist_entry(identifier).await?;
        let violations = self
            .violations
            .count(&self.keys.violations(identifier))
            .await?;

        let mut scopes: Vec<(Scope, u64)> = vec![(Scope::Global, self.config.global.max_requests)];
        scopes.extend(
            self.config
                .tiers
                .quotas
                .iter()
                .map(|(tier, max)| (Scope::Tier(tier.clone()), *max)),
        );
        scopes.extend(
            self.config
                .endpoints
                .iter()
                .map(|e| (e.scope(), e.quota.max_requests)),
        );

        let mut active_limits = Vec::new();
        for (scope, limit) in scopes {
            let key = self
                .keys
                .window(&RateLimitKey::new(scope.clone(), identifier.clone()));
            if let Some((count, ttl)) = self.windows.peek(&key).await? {
                active_limits.push(ActiveLimit {
                    scope: scope.to_string(),
                    count,
                    limit,
                    reset_after_secs: ttl.map(ceil_secs),
                });
            }
        }

        Ok(RateLimitStatus {
            identifier: identifier.clone(),
            blocked: block.is_some(),
            block,
            whitelisted: whitelist.is_some(),
            whitelist,
            violations,
            active_limits,
        })
    }

    pub async fn list_whitelisted(
        &self,
    ) -> Result<Vec<(Identifier, WhitelistEntry)>, AdmissionError> {
        Ok(self.registry.list_whitelisted().await?)
    }

    pub async fn list_blocked(&self) -> Result<Vec<(Identifier, BlockRecord)>, AdmissionError> {
        Ok(self.registry.list_blocked().await?)
    }
}

fn fail_open(stage: &str, identifier: &Identifier, error: &StoreError) {
    tracing::error!(
        stage,
        key = %identifier,
        error = %error,
        "Counter store unavailable, failing open"
    );
}

/// Whole seconds, rounded up.
pub(crate) fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

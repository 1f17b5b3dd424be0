use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dealflow_core::domain::{
    AdmissionDecision, BucketOutcome, BucketSpec, CallerIdentity, Identifier, Rejection,
    RejectionReason, Scope, UserProfile, codes,
};
use dealflow_core::ports::{Counter, CounterStore, StoreError};
use dealflow_infra::InMemoryCounterStore;
use futures::future::join_all;

use super::*;
use crate::config::{BurstConfig, EndpointOverride};

fn config() -> AdmissionConfig {
    AdmissionConfig {
        global: WindowQuota {
            window: Duration::from_secs(60),
            max_requests: 1000,
        },
        endpoints: vec![],
        burst: BurstConfig {
            enabled: false,
            ..BurstConfig::default()
        },
        ..AdmissionConfig::default()
    }
}

fn pipeline(config: AdmissionConfig) -> AdmissionPipeline {
    AdmissionPipeline::new(config, Arc::new(InMemoryCounterStore::new()))
}

fn anonymous(method: &str, path: &str) -> AdmissionRequest {
    AdmissionRequest::new(method, path).with_address("203.0.113.7")
}

fn address() -> Identifier {
    Identifier::Address("203.0.113.7".into())
}

fn rejection(decision: AdmissionDecision) -> Rejection {
    match decision {
        AdmissionDecision::Reject(rejection) => rejection,
        AdmissionDecision::Admit(admission) => panic!("expected rejection, got {:?}", admission),
    }
}

fn admission(decision: AdmissionDecision) -> Admission {
    match decision {
        AdmissionDecision::Admit(admission) => admission,
        AdmissionDecision::Reject(rejection) => panic!("expected admission, got {:?}", rejection),
    }
}

/// In-memory store that fails the named operations.
struct FlakyStore {
    inner: InMemoryCounterStore,
    failing: HashSet<&'static str>,
}

impl FlakyStore {
    fn failing(ops: &[&'static str]) -> Self {
        Self {
            inner: InMemoryCounterStore::new(),
            failing: ops.iter().copied().collect(),
        }
    }

    fn check(&self, op: &'static str) -> Result<(), StoreError> {
        if self.failing.contains(op) || self.failing.contains("*") {
            return Err(StoreError::Timeout {
                op,
                timeout: Duration::from_millis(50),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CounterStore for FlakyStore {
    fn backend(&self) -> &'static str {
        "flaky"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check("ping")?;
        self.inner.ping().await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check("get")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.check("set")?;
        self.inner.set(key, value, ttl).await
    }

    async fn incr(&self, key: &str, by: i64, ttl: Duration) -> Result<Counter, StoreError> {
        self.check("incr")?;
        self.inner.incr(key, by, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check("delete")?;
        self.inner.delete(key).await
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, StoreError> {
        self.check("delete_by_pattern")?;
        self.inner.delete_by_pattern(pattern).await
    }

    async fn set_add(&self, set_key: &str, member: &str) -> Result<(), StoreError> {
        self.check("set_add")?;
        self.inner.set_add(set_key, member).await
    }

    async fn set_remove(&self, set_key: &str, member: &str) -> Result<(), StoreError> {
        self.check("set_remove")?;
        self.inner.set_remove(set_key, member).await
    }

    async fn set_is_member(&self, set_key: &str, member: &str) -> Result<bool, StoreError> {
        self.check("set_is_member")?;
        self.inner.set_is_member(set_key, member).await
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>, StoreError> {
        self.check("set_members")?;
        self.inner.set_members(set_key).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.check("ttl")?;
        self.inner.ttl(key).await
    }

    async fn take_token(&self, key: &str, spec: &BucketSpec) -> Result<BucketOutcome, StoreError> {
        self.check("take_token")?;
        self.inner.take_token(key, spec).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_global_window_admits_max_then_rejects_then_resets() {
    let pipeline = pipeline(AdmissionConfig {
        global: WindowQuota {
            window: Duration::from_secs(60),
            max_requests: 3,
        },
        ..config()
    });
    let request = anonymous("GET", "/api/deals");

    for _ in 0..3 {
        assert!(pipeline.check(&request).await.is_admitted());
    }

    let rejected = rejection(pipeline.check(&request).await);
    assert_eq!(rejected.http_status, 429);
    assert_eq!(rejected.code, codes::GLOBAL_LIMIT_EXCEEDED);
    assert_eq!(rejected.retry_after_secs, Some(60));
    assert_eq!(
        rejected.reason,
        RejectionReason::QuotaExceeded {
            scope: Scope::Global
        }
    );

    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(pipeline.check(&request).await.is_admitted());
}

#[tokio::test(start_paused = true)]
async fn test_login_endpoint_scenario() {
    let pipeline = pipeline(AdmissionConfig {
        endpoints: vec![EndpointOverride::new(
            "/auth/login",
            Duration::from_millis(900_000),
            5,
        )],
        ..config()
    });
    let request = anonymous("POST", "/auth/login");

    let mut admitted = 0;
    let mut last = None;
    for _ in 0..6 {
        match pipeline.check(&request).await {
            AdmissionDecision::Admit(_) => admitted += 1,
            AdmissionDecision::Reject(rejection) => last = Some(rejection),
        }
    }

    assert_eq!(admitted, 5);
    let rejected = last.expect("sixth request rejected");
    assert_eq!(rejected.http_status, 429);
    assert_eq!(rejected.code, codes::ENDPOINT_LIMIT_EXCEEDED);
    assert_eq!(rejected.retry_after_secs, Some(900));

    // Other routes are unaffected by the endpoint window.
    assert!(pipeline.check(&anonymous("GET", "/api/deals")).await.is_admitted());
}

#[tokio::test(start_paused = true)]
async fn test_tier_layer_uses_classified_tier() {
    let mut config = config();
    config.tiers.quotas.insert("anonymous".into(), 2);
    let pipeline = pipeline(config);

    let request = anonymous("GET", "/api/deals");
    assert!(pipeline.check(&request).await.is_admitted());
    assert!(pipeline.check(&request).await.is_admitted());

    let rejected = rejection(pipeline.check(&request).await);
    assert_eq!(rejected.code, codes::TIER_LIMIT_EXCEEDED);

    // A pro user is counted separately and against a larger quota.
    let user = CallerIdentity::AuthenticatedUser(UserProfile::new("u-1").with_subscription("pro"));
    let request = request.with_caller(user);
    for _ in 0..5 {
        assert!(pipeline.check(&request).await.is_admitted());
    }
}

#[tokio::test(start_paused = true)]
async fn test_burst_rejection_is_last_gate() {
    let pipeline = pipeline(AdmissionConfig {
        burst: BurstConfig {
            enabled: true,
            initial_tokens: 2.0,
            max_tokens: 5.0,
            refill_per_sec: 1.0,
        },
        ..config()
    });
    let request = anonymous("GET", "/api/deals");

    assert!(pipeline.check(&request).await.is_admitted());
    assert!(pipeline.check(&request).await.is_admitted());

    let rejected = rejection(pipeline.check(&request).await);
    assert_eq!(rejected.code, codes::BURST_LIMIT_EXCEEDED);
    assert_eq!(rejected.retry_after_secs, Some(1));

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(pipeline.check(&request).await.is_admitted());
}

#[tokio::test(start_paused = true)]
async fn test_admitted_quota_reports_tightest_layer() {
    let pipeline = pipeline(AdmissionConfig {
        endpoints: vec![EndpointOverride::new("/exports/*", Duration::from_secs(60), 3)],
        ..config()
    });

    let admitted = admission(pipeline.check(&anonymous("GET", "/exports/deals")).await);
    let quota = admitted.quota.expect("quota snapshot");
    assert_eq!(quota.limit, 3);
    assert_eq!(quota.remaining, 2);
}

#[tokio::test(start_paused = true)]
async fn test_progressive_penalty_then_block() {
    let pipeline = pipeline(AdmissionConfig {
        global: WindowQuota {
            window: Duration::from_secs(60),
            max_requests: 1,
        },
        ..config()
    });
    let request = anonymous("GET", "/api/deals");

    assert!(pipeline.check(&request).await.is_admitted());

    let mut hints = Vec::new();
    for _ in 0..20 {
        hints.push(rejection(pipeline.check(&request).await).retry_after_secs);
    }

    // Violations 1-4 plain, 5-9 doubled, 10-19 quadrupled.
    assert_eq!(hints[0], Some(60));
    assert_eq!(hints[3], Some(60));
    assert_eq!(hints[4], Some(120));
    assert_eq!(hints[8], Some(120));
    assert_eq!(hints[9], Some(240));
    assert_eq!(hints[18], Some(240));

    let blocked = rejection(pipeline.check(&request).await);
    assert_eq!(blocked.http_status, 403);
    assert_eq!(blocked.code, codes::CALLER_BLOCKED);
    assert_eq!(blocked.retry_after_secs, None);

    let status = pipeline.status(&address()).await.unwrap();
    assert!(status.blocked);
    assert_eq!(
        status.block.map(|b| b.reason),
        Some(REPEATED_VIOLATIONS_REASON.to_string())
    );
    // Rejections while blocked are not violations.
    assert_eq!(status.violations, 20);
}

#[tokio::test(start_paused = true)]
async fn test_lookalike_override_keys_have_separate_quotas() {
    let pipeline = pipeline(AdmissionConfig {
        global: WindowQuota {
            window: Duration::from_secs(60),
            max_requests: 1,
        },
        ..config()
    });
    let braces = AdmissionRequest::new("GET", "/api/deals").with_key_override("a{b}");
    let underscores = AdmissionRequest::new("GET", "/api/deals").with_key_override("a_b_");

    assert!(pipeline.check(&braces).await.is_admitted());
    assert!(pipeline.check(&underscores).await.is_admitted());
    assert!(!pipeline.check(&braces).await.is_admitted());
}

#[tokio::test(start_paused = true)]
async fn test_block_expires() {
    let pipeline = pipeline(config());

    pipeline
        .block(&address(), Duration::from_secs(30), "Manual block")
        .await
        .unwrap();
    let request = anonymous("GET", "/api/deals");
    assert!(!pipeline.check(&request).await.is_admitted());

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(pipeline.check(&request).await.is_admitted());
}

#[tokio::test(start_paused = true)]
async fn test_reset_clears_violations_block_and_windows() {
    let pipeline = pipeline(AdmissionConfig {
        global: WindowQuota {
            window: Duration::from_secs(60),
            max_requests: 2,
        },
        ..config()
    });
    let request = anonymous("GET", "/api/deals");

    for _ in 0..25 {
        pipeline.check(&request).await;
    }
    let before = pipeline.status(&address()).await.unwrap();
    assert!(before.blocked);
    assert!(before.violations > 0);
    assert!(!before.active_limits.is_empty());

    let outcome = pipeline.reset(&address()).await.unwrap();
    assert!(outcome.block_cleared);
    assert!(outcome.violations_cleared);
    assert_eq!(outcome.windows_cleared, 2);

    let after = pipeline.status(&address()).await.unwrap();
    assert!(!after.blocked);
    assert_eq!(after.violations, 0);
    assert!(after.active_limits.is_empty());

    assert!(pipeline.check(&request).await.is_admitted());
    assert!(pipeline.check(&request).await.is_admitted());
}

#[tokio::test(start_paused = true)]
async fn test_reset_only_touches_its_identifier() {
    let pipeline = pipeline(config());
    let other = AdmissionRequest::new("GET", "/api/deals").with_address("198.51.100.1");

    pipeline.check(&anonymous("GET", "/api/deals")).await;
    pipeline.check(&other).await;

    pipeline.reset(&address()).await.unwrap();

    let status = pipeline
        .status(&Identifier::Address("198.51.100.1".into()))
        .await
        .unwrap();
    assert_eq!(status.active_limits.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_whitelist_takes_precedence_over_block() {
    let pipeline = pipeline(AdmissionConfig {
        global: WindowQuota {
            window: Duration::from_secs(60),
            max_requests: 1,
        },
        ..config()
    });
    let id = address();

    pipeline
        .block(&id, Duration::from_secs(3600), "Manual block")
        .await
        .unwrap();
    pipeline.whitelist_add(&id, None).await.unwrap();

    let request = anonymous("GET", "/api/deals");
    for _ in 0..5 {
        let admitted = admission(pipeline.check(&request).await);
        assert!(admitted.bypassed);
    }

    let status = pipeline.status(&id).await.unwrap();
    assert!(status.blocked);
    assert!(status.whitelisted);
    // Whitelisted traffic is not counted at all.
    assert_eq!(status.violations, 0);
    assert!(status.active_limits.is_empty());

    assert!(pipeline.whitelist_remove(&id).await.unwrap());
    assert!(!pipeline.check(&request).await.is_admitted());
}

#[tokio::test(start_paused = true)]
async fn test_timed_whitelist_expires() {
    let pipeline = pipeline(AdmissionConfig {
        global: WindowQuota {
            window: Duration::from_secs(600),
            max_requests: 1,
        },
        ..config()
    });
    let request = anonymous("GET", "/api/deals");

    pipeline
        .whitelist_add(&address(), Some(Duration::from_secs(10)))
        .await
        .unwrap();
    assert!(pipeline.check(&request).await.is_admitted());
    assert!(pipeline.check(&request).await.is_admitted());

    tokio::time::advance(Duration::from_secs(11)).await;
    assert!(pipeline.check(&request).await.is_admitted());
    assert!(!pipeline.check(&request).await.is_admitted());

    assert!(pipeline.list_whitelisted().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_rejects_zero_durations() {
    let pipeline = pipeline(config());

    assert!(matches!(
        pipeline.whitelist_add(&address(), Some(Duration::ZERO)).await,
        Err(AdmissionError::InvalidRequest(_))
    ));
    assert!(matches!(
        pipeline.block(&address(), Duration::ZERO, "x").await,
        Err(AdmissionError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_listings() {
    let pipeline = pipeline(config());
    let user = Identifier::User("u-1".into());
    let key = Identifier::ApiCredential("k-1".into());

    pipeline.whitelist_add(&user, None).await.unwrap();
    pipeline
        .block(&key, Duration::from_secs(60), "Abuse report")
        .await
        .unwrap();

    let whitelisted = pipeline.list_whitelisted().await.unwrap();
    assert_eq!(whitelisted.len(), 1);
    assert_eq!(whitelisted[0].0, user);

    let blocked = pipeline.list_blocked().await.unwrap();
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].0, key);
    assert_eq!(blocked[0].1.reason, "Abuse report");
}

#[tokio::test(start_paused = true)]
async fn test_skip_successful_refunds_only_successes() {
    let pipeline = pipeline(AdmissionConfig {
        endpoints: vec![
            EndpointOverride::new("/auth/login", Duration::from_secs(900), 2)
                .with_method("POST")
                .skip_successful(),
        ],
        ..config()
    });
    let request = anonymous("POST", "/auth/login");

    for _ in 0..5 {
        let admitted = admission(pipeline.check(&request).await);
        assert_eq!(admitted.refund_on_success.len(), 1);
        pipeline.settle(&admitted, 200).await;
    }

    for _ in 0..2 {
        let admitted = admission(pipeline.check(&request).await);
        pipeline.settle(&admitted, 401).await;
    }
    let rejected = rejection(pipeline.check(&request).await);
    assert_eq!(rejected.code, codes::ENDPOINT_LIMIT_EXCEEDED);
}

#[tokio::test(start_paused = true)]
async fn test_method_overrides_count_separately() {
    let pipeline = pipeline(AdmissionConfig {
        endpoints: vec![
            EndpointOverride::new("/auth/login", Duration::from_secs(900), 2).with_method("POST"),
            EndpointOverride::new("/auth/login", Duration::from_secs(900), 100).with_method("GET"),
        ],
        ..config()
    });

    for _ in 0..5 {
        assert!(pipeline.check(&anonymous("GET", "/auth/login")).await.is_admitted());
    }
    assert!(pipeline.check(&anonymous("POST", "/auth/login")).await.is_admitted());
    assert!(pipeline.check(&anonymous("POST", "/auth/login")).await.is_admitted());
    let rejected = rejection(pipeline.check(&anonymous("POST", "/auth/login")).await);
    assert_eq!(rejected.code, codes::ENDPOINT_LIMIT_EXCEEDED);

    let status = pipeline.status(&address()).await.unwrap();
    let count = |scope: &str| {
        status
            .active_limits
            .iter()
            .find(|l| l.scope == scope)
            .map(|l| l.count)
    };
    assert_eq!(count("endpoint:GET:/auth/login"), Some(5));
    assert_eq!(count("endpoint:POST:/auth/login"), Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_refund_after_window_expiry_does_not_recreate() {
    let pipeline = pipeline(AdmissionConfig {
        endpoints: vec![
            EndpointOverride::new("/auth/login", Duration::from_secs(60), 2).skip_successful(),
        ],
        ..config()
    });

    let admitted = admission(pipeline.check(&anonymous("POST", "/auth/login")).await);
    tokio::time::advance(Duration::from_secs(61)).await;
    pipeline.settle(&admitted, 200).await;

    let status = pipeline.status(&address()).await.unwrap();
    assert!(
        status
            .active_limits
            .iter()
            .all(|l| !l.scope.starts_with("endpoint"))
    );
}

#[tokio::test]
async fn test_fail_open_when_store_is_down() {
    let store = Arc::new(FlakyStore::failing(&["*"]));
    let pipeline = AdmissionPipeline::new(
        AdmissionConfig {
            burst: BurstConfig::default(),
            ..config()
        },
        store,
    );

    for _ in 0..50 {
        let admitted = admission(pipeline.check(&anonymous("POST", "/auth/login")).await);
        assert!(admitted.quota.is_none());
    }

    // Administrative operations surface the error instead.
    assert!(matches!(
        pipeline.status(&address()).await,
        Err(AdmissionError::Store(StoreError::Timeout { .. }))
    ));
}

#[tokio::test]
async fn test_fail_open_per_stage() {
    // Registry lookups fail: quota layers still apply.
    let pipeline = AdmissionPipeline::new(
        AdmissionConfig {
            global: WindowQuota {
                window: Duration::from_secs(60),
                max_requests: 1,
            },
            ..config()
        },
        Arc::new(FlakyStore::failing(&["get"])),
    );
    let request = anonymous("GET", "/api/deals");
    assert!(pipeline.check(&request).await.is_admitted());
    assert!(!pipeline.check(&request).await.is_admitted());

    // Bucket fails: the burst stage passes.
    let pipeline = AdmissionPipeline::new(
        AdmissionConfig {
            burst: BurstConfig {
                enabled: true,
                initial_tokens: 0.0,
                max_tokens: 1.0,
                refill_per_sec: 0.001,
            },
            ..config()
        },
        Arc::new(FlakyStore::failing(&["take_token"])),
    );
    assert!(pipeline.check(&request).await.is_admitted());

    // Violation recording fails: the rejection stands.
    let pipeline = AdmissionPipeline::new(
        AdmissionConfig {
            burst: BurstConfig {
                enabled: true,
                initial_tokens: 0.0,
                max_tokens: 1.0,
                refill_per_sec: 0.001,
            },
            ..config()
        },
        Arc::new(FlakyStore::failing(&["incr"])),
    );
    let rejected = rejection(pipeline.check(&request).await);
    assert_eq!(rejected.code, codes::BURST_LIMIT_EXCEEDED);
}

#[tokio::test]
async fn test_concurrent_requests_admit_exactly_max() {
    let pipeline = Arc::new(pipeline(AdmissionConfig {
        global: WindowQuota {
            window: Duration::from_secs(60),
            max_requests: 10,
        },
        ..config()
    }));
    let request = anonymous("GET", "/api/deals");

    let decisions = join_all((0..50).map(|_| {
        let pipeline = pipeline.clone();
        let request = request.clone();
        async move { pipeline.check(&request).await }
    }))
    .await;

    let admitted = decisions.iter().filter(|d| d.is_admitted()).count();
    assert_eq!(admitted, 10);
}

#[tokio::test]
async fn test_concurrent_requests_across_tasks() {
    let pipeline = Arc::new(pipeline(AdmissionConfig {
        global: WindowQuota {
            window: Duration::from_secs(60),
            max_requests: 10,
        },
        ..config()
    }));

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                pipeline
                    .check(&anonymous("GET", "/api/invoices"))
                    .await
                    .is_admitted()
            })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 10);
}

#[tokio::test]
async fn test_disabled_pipeline_bypasses() {
    let pipeline = pipeline(AdmissionConfig {
        enabled: false,
        global: WindowQuota {
            window: Duration::from_secs(60),
            max_requests: 1,
        },
        ..config()
    });

    for _ in 0..3 {
        let admitted = admission(pipeline.check(&anonymous("GET", "/")).await);
        assert!(admitted.bypassed);
    }
}

//! Admission configuration, loaded from the environment at startup.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use dealflow_core::domain::{BucketSpec, Scope};
use dealflow_core::env::parse_flag;

/// Configuration errors. Any of these aborts startup.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    InvalidVar { var: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    fn var(var: &str, reason: impl Into<String>) -> Self {
        Self::InvalidVar {
            var: var.to_string(),
            reason: reason.into(),
        }
    }
}

/// Fixed-window quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowQuota {
    pub window: Duration,
    pub max_requests: u64,
}

/// Endpoint-specific window applied on top of the global and tier layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointOverride {
    /// Exact path, or a prefix when it ends in `*`.
    pub path: String,
    /// Restrict the override to one HTTP method.
    pub method: Option<String>,
    pub quota: WindowQuota,
    /// Un-count requests that end with a status below 400.
    pub skip_successful: bool,
}

impl EndpointOverride {
    pub fn new(path: impl Into<String>, window: Duration, max_requests: u64) -> Self {
        Self {
            path: normalize_path(&path.into()),
            method: None,
            quota: WindowQuota {
                window,
                max_requests,
            },
            skip_successful: false,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into().to_ascii_uppercase());
        self
    }

    pub fn skip_successful(mut self) -> Self {
        self.skip_successful = true;
        self
    }

    /// Counter scope of this override. Method-restricted overrides count
    /// separately from each other and from an unrestricted one on the same path.
    pub fn scope(&self) -> Scope {
        match &self.method {
            Some(method) => Scope::Endpoint(format!("{}:{}", method, self.path)),
            None => Scope::Endpoint(self.path.clone()),
        }
    }

    fn prefix(&self) -> Option<&str> {
        self.path.strip_suffix('*')
    }

    fn accepts_method(&self, method: &str) -> bool {
        self.method
            .as_deref()
            .is_none_or(|m| m.eq_ignore_ascii_case(method))
    }
}

/// Token-bucket burst limiter settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurstConfig {
    pub enabled: bool,
    pub initial_tokens: f64,
    pub max_tokens: f64,
    pub refill_per_sec: f64,
}

impl BurstConfig {
    pub fn spec(&self) -> BucketSpec {
        BucketSpec {
            initial_tokens: self.initial_tokens,
            max_tokens: self.max_tokens,
            refill_per_sec: self.refill_per_sec,
        }
    }
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_tokens: 10.0,
            max_tokens: 20.0,
            refill_per_sec: 1.0,
        }
    }
}

/// One stair of the escalation staircase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationStep {
    pub threshold: u64,
    pub penalty_multiplier: u32,
}

/// Violation tracking and escalation settings.
///
/// Reaching the last step's threshold blocks the caller for `block_duration`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationConfig {
    pub steps: Vec<EscalationStep>,
    pub block_duration: Duration,
    pub violation_window: Duration,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            steps: vec![
                EscalationStep {
                    threshold: 5,
                    penalty_multiplier: 2,
                },
                EscalationStep {
                    threshold: 10,
                    penalty_multiplier: 4,
                },
                EscalationStep {
                    threshold: 20,
                    penalty_multiplier: 8,
                },
            ],
            block_duration: Duration::from_secs(24 * 3600),
            violation_window: Duration::from_secs(24 * 3600),
        }
    }
}

/// Tier quotas and the classifier tables that map caller metadata onto them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierConfig {
    /// Tier name to max requests per global window.
    pub quotas: BTreeMap<String, u64>,
    /// Most restrictive tier, used when metadata is missing or unknown.
    pub fallback_tier: String,
    pub api_credential_tier: String,
    pub role_tiers: HashMap<String, String>,
    pub subscription_tiers: HashMap<String, String>,
    pub account_type_tiers: HashMap<String, String>,
}

impl Default for TierConfig {
    fn default() -> Self {
        let quotas = [
            ("anonymous", 100),
            ("free", 500),
            ("pro", 2_000),
            ("agency", 5_000),
            ("enterprise", 20_000),
            ("api", 10_000),
            ("internal", 100_000),
        ];

        Self {
            quotas: quotas
                .into_iter()
                .map(|(tier, max)| (tier.to_string(), max))
                .collect(),
            fallback_tier: "anonymous".to_string(),
            api_credential_tier: "api".to_string(),
            role_tiers: table(&[("admin", "internal"), ("super_admin", "internal")]),
            subscription_tiers: table(&[
                ("free", "free"),
                ("pro", "pro"),
                ("enterprise", "enterprise"),
            ]),
            account_type_tiers: table(&[
                ("agency", "agency"),
                ("influencer", "free"),
                ("brand", "free"),
            ]),
        }
    }
}

fn table(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Complete admission configuration. Immutable once the pipeline is built.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionConfig {
    pub enabled: bool,
    pub key_prefix: String,
    /// Global ceiling; its window length is shared by the tier layer.
    pub global: WindowQuota,
    pub tiers: TierConfig,
    pub endpoints: Vec<EndpointOverride>,
    pub burst: BurstConfig,
    pub escalation: EscalationConfig,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key_prefix: "ratelimit".to_string(),
            global: WindowQuota {
                window: Duration::from_secs(900),
                max_requests: 1000,
            },
            tiers: TierConfig::default(),
            endpoints: default_endpoints(),
            burst: BurstConfig::default(),
            escalation: EscalationConfig::default(),
        }
    }
}

fn default_endpoints() -> Vec<EndpointOverride> {
    vec![
        EndpointOverride::new("/api/auth/login", Duration::from_millis(900_000), 5)
            .with_method("POST")
            .skip_successful(),
        EndpointOverride::new("/api/auth/register", Duration::from_millis(3_600_000), 3)
            .with_method("POST"),
        EndpointOverride::new("/api/auth/password-reset*", Duration::from_millis(3_600_000), 3),
    ]
}

impl AdmissionConfig {
    /// Load from `RATE_LIMIT_*` environment variables and validate.
    /// Variables that are not valid UTF-8 are ignored.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(
            std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
        )
    }

    /// Load from an explicit set of variables and validate.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let lookup = |name: &str| vars.get(name).cloned();
        let defaults = Self::default();
        let env = Lookup(&lookup);

        let mut tiers = defaults.tiers;
        for (name, value) in env.prefixed(TIER_VAR_PREFIX, &tier_vars(&vars)) {
            let max = value
                .parse()
                .map_err(|_| ConfigError::var(&format!("{}{}", TIER_VAR_PREFIX, name), "expected a positive integer"))?;
            tiers.quotas.insert(name.to_ascii_lowercase(), max);
        }
        if let Some(tier) = env.string("RATE_LIMIT_FALLBACK_TIER") {
            tiers.fallback_tier = tier;
        }
        if let Some(tier) = env.string("RATE_LIMIT_API_CREDENTIAL_TIER") {
            tiers.api_credential_tier = tier;
        }
        if let Some(raw) = env.string("RATE_LIMIT_ROLE_TIERS") {
            tiers.role_tiers = parse_table("RATE_LIMIT_ROLE_TIERS", &raw)?;
        }
        if let Some(raw) = env.string("RATE_LIMIT_SUBSCRIPTION_TIERS") {
            tiers.subscription_tiers = parse_table("RATE_LIMIT_SUBSCRIPTION_TIERS", &raw)?;
        }
        if let Some(raw) = env.string("RATE_LIMIT_ACCOUNT_TYPE_TIERS") {
            tiers.account_type_tiers = parse_table("RATE_LIMIT_ACCOUNT_TYPE_TIERS", &raw)?;
        }

        let endpoints = match env.string("RATE_LIMIT_ENDPOINTS") {
            Some(raw) => parse_endpoints(&raw)?,
            None => defaults.endpoints,
        };

        let escalation = EscalationConfig {
            steps: match env.string("RATE_LIMIT_ESCALATION") {
                Some(raw) => parse_escalation(&raw)?,
                None => defaults.escalation.steps,
            },
            block_duration: Duration::from_secs(
                env.parse("RATE_LIMIT_BLOCK_SECS")?
                    .unwrap_or(defaults.escalation.block_duration.as_secs()),
            ),
            violation_window: Duration::from_secs(
                env.parse("RATE_LIMIT_VIOLATION_WINDOW_SECS")?
                    .unwrap_or(defaults.escalation.violation_window.as_secs()),
            ),
        };

        let config = Self {
            enabled: env.flag("RATE_LIMIT_ENABLED")?.unwrap_or(defaults.enabled),
            key_prefix: env
                .string("RATE_LIMIT_KEY_PREFIX")
                .unwrap_or(defaults.key_prefix),
            global: WindowQuota {
                window: Duration::from_secs(
                    env.parse("RATE_LIMIT_WINDOW_SECS")?
                        .unwrap_or(defaults.global.window.as_secs()),
                ),
                max_requests: env
                    .parse("RATE_LIMIT_MAX_REQUESTS")?
                    .unwrap_or(defaults.global.max_requests),
            },
            tiers,
            endpoints,
            burst: BurstConfig {
                enabled: env
                    .flag("RATE_LIMIT_BURST_ENABLED")?
                    .unwrap_or(defaults.burst.enabled),
                initial_tokens: env
                    .parse("RATE_LIMIT_BURST_INITIAL_TOKENS")?
                    .unwrap_or(defaults.burst.initial_tokens),
                max_tokens: env
                    .parse("RATE_LIMIT_BURST_MAX_TOKENS")?
                    .unwrap_or(defaults.burst.max_tokens),
                refill_per_sec: env
                    .parse("RATE_LIMIT_BURST_REFILL_PER_SEC")?
                    .unwrap_or(defaults.burst.refill_per_sec),
            },
            escalation,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is internally consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_prefix.is_empty() {
            return Err(ConfigError::Invalid("key prefix must not be empty".into()));
        }
        check_quota("global", &self.global)?;

        for (tier, max) in &self.tiers.quotas {
            if *max == 0 {
                return Err(ConfigError::Invalid(format!("tier '{}' has a zero quota", tier)));
            }
        }
        let known = |tier: &str| self.tiers.quotas.contains_key(tier);
        if !known(&self.tiers.fallback_tier) {
            return Err(ConfigError::Invalid(format!(
                "fallback tier '{}' has no quota",
                self.tiers.fallback_tier
            )));
        }
        if !known(&self.tiers.api_credential_tier) {
            return Err(ConfigError::Invalid(format!(
                "API credential tier '{}' has no quota",
                self.tiers.api_credential_tier
            )));
        }
        for tier in self
            .tiers
            .role_tiers
            .values()
            .chain(self.tiers.subscription_tiers.values())
            .chain(self.tiers.account_type_tiers.values())
        {
            if !known(tier) {
                return Err(ConfigError::Invalid(format!(
                    "classifier table refers to unknown tier '{}'",
                    tier
                )));
            }
        }

        for endpoint in &self.endpoints {
            if !endpoint.path.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "endpoint path '{}' must start with '/'",
                    endpoint.path
                )));
            }
            check_quota(&endpoint.path, &endpoint.quota)?;
        }

        if self.burst.enabled {
            let burst = &self.burst;
            if !(burst.max_tokens >= 1.0) {
                return Err(ConfigError::Invalid("burst max tokens must be at least 1".into()));
            }
            if !(burst.initial_tokens >= 0.0 && burst.initial_tokens <= burst.max_tokens) {
                return Err(ConfigError::Invalid(
                    "burst initial tokens must be between 0 and max tokens".into(),
                ));
            }
            if !(burst.refill_per_sec > 0.0) || !burst.refill_per_sec.is_finite() {
                return Err(ConfigError::Invalid("burst refill rate must be positive".into()));
            }
        }

        let mut previous = 0;
        for step in &self.escalation.steps {
            if step.threshold <= previous {
                return Err(ConfigError::Invalid(
                    "escalation thresholds must be strictly increasing and non-zero".into(),
                ));
            }
            if step.penalty_multiplier == 0 {
                return Err(ConfigError::Invalid("penalty multiplier must be at least 1".into()));
            }
            previous = step.threshold;
        }
        if self.escalation.block_duration.is_zero() || self.escalation.violation_window.is_zero() {
            return Err(ConfigError::Invalid(
                "block duration and violation window must be non-zero".into(),
            ));
        }

        Ok(())
    }

    /// Find the override for a request: exact match first, then the longest
    /// matching `*` prefix.
    pub fn endpoint_override(&self, method: &str, path: &str) -> Option<&EndpointOverride> {
        let path = normalize_path(path);
        let candidates = self.endpoints.iter().filter(|e| e.accepts_method(method));

        let mut best: Option<&EndpointOverride> = None;
        for endpoint in candidates {
            match endpoint.prefix() {
                None if endpoint.path == path => return Some(endpoint),
                Some(prefix) if path.starts_with(prefix) => {
                    let longer = best
                        .and_then(|b| b.prefix())
                        .is_none_or(|current| prefix.len() > current.len());
                    if longer {
                        best = Some(endpoint);
                    }
                }
                _ => {}
            }
        }
        best
    }

    /// Quota for a tier, falling back to the most restrictive one.
    pub fn tier_quota(&self, tier: &str) -> u64 {
        self.tiers
            .quotas
            .get(tier)
            .or_else(|| self.tiers.quotas.get(&self.tiers.fallback_tier))
            .copied()
            .unwrap_or(self.global.max_requests)
    }
}

fn check_quota(name: &str, quota: &WindowQuota) -> Result<(), ConfigError> {
    if quota.window.is_zero() || quota.max_requests == 0 {
        return Err(ConfigError::Invalid(format!(
            "'{}' needs a non-zero window and max requests",
            name
        )));
    }
    Ok(())
}

/// Strip a trailing slash, except on the root.
pub(crate) fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.len() > 1 && trimmed.ends_with('/') {
        trimmed.trim_end_matches('/').to_string()
    } else {
        trimmed.to_string()
    }
}

struct Lookup<'a, F>(&'a F);

impl<F> Lookup<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, var: &str) -> Result<Option<T>, ConfigError> {
        self.string(var)
            .map(|raw| {
                raw.parse()
                    .map_err(|_| ConfigError::var(var, format!("cannot parse '{}'", raw)))
            })
            .transpose()
    }

    fn flag(&self, var: &str) -> Result<Option<bool>, ConfigError> {
        self.string(var)
            .map(|raw| {
                parse_flag(&raw)
                    .ok_or_else(|| ConfigError::var(var, format!("expected a boolean, got '{}'", raw)))
            })
            .transpose()
    }

    fn prefixed(&self, prefix: &str, names: &[String]) -> Vec<(String, String)> {
        names
            .iter()
            .filter_map(|name| {
                let value = self.string(name)?;
                Some((name.strip_prefix(prefix)?.to_string(), value))
            })
            .collect()
    }
}

const TIER_VAR_PREFIX: &str = "RATE_LIMIT_TIER_";

/// Every `RATE_LIMIT_TIER_<NAME>` variable in `vars`, sorted for stable
/// error reporting.
fn tier_vars(vars: &HashMap<String, String>) -> Vec<String> {
    let mut names: Vec<String> = vars
        .keys()
        .filter(|name| name.len() > TIER_VAR_PREFIX.len() && name.starts_with(TIER_VAR_PREFIX))
        .cloned()
        .collect();
    names.sort();
    names
}

fn parse_table(var: &str, raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, tier) = pair
                .split_once('=')
                .ok_or_else(|| ConfigError::var(var, format!("expected value=tier, got '{}'", pair)))?;
            Ok((key.trim().to_string(), tier.trim().to_ascii_lowercase()))
        })
        .collect()
}

/// Parse `[METHOD ]path=window_ms:max[:skip]` entries separated by commas.
fn parse_endpoints(raw: &str) -> Result<Vec<EndpointOverride>, ConfigError> {
    const VAR: &str = "RATE_LIMIT_ENDPOINTS";

    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (target, limits) = entry
                .rsplit_once('=')
                .ok_or_else(|| ConfigError::var(VAR, format!("missing '=' in '{}'", entry)))?;

            let mut parts = limits.split(':');
            let window_ms: u64 = parts
                .next()
                .and_then(|v| v.trim().parse().ok())
                .ok_or_else(|| ConfigError::var(VAR, format!("bad window in '{}'", entry)))?;
            let max: u64 = parts
                .next()
                .and_then(|v| v.trim().parse().ok())
                .ok_or_else(|| ConfigError::var(VAR, format!("bad max in '{}'", entry)))?;
            let skip = match parts.next().map(str::trim) {
                None => false,
                Some("skip") => true,
                Some(other) => {
                    return Err(ConfigError::var(
                        VAR,
                        format!("unknown flag '{}' in '{}'", other, entry),
                    ));
                }
            };

            let target = target.trim();
            let mut endpoint = match target.split_once(char::is_whitespace) {
                Some((method, path)) => {
                    EndpointOverride::new(path.trim(), Duration::from_millis(window_ms), max)
                        .with_method(method)
                }
                None => EndpointOverride::new(target, Duration::from_millis(window_ms), max),
            };
            endpoint.skip_successful = skip;
            Ok(endpoint)
        })
        .collect()
}

/// Parse `count:multiplier` steps separated by commas.
fn parse_escalation(raw: &str) -> Result<Vec<EscalationStep>, ConfigError> {
    const VAR: &str = "RATE_LIMIT_ESCALATION";

    raw.split(',')
        .map(str::trim)
        .filter(|step| !step.is_empty())
        .map(|step| {
            let (threshold, multiplier) = step
                .split_once(':')
                .ok_or_else(|| ConfigError::var(VAR, format!("expected count:multiplier, got '{}'", step)))?;
            Ok(EscalationStep {
                threshold: threshold
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::var(VAR, format!("bad count in '{}'", step)))?,
                penalty_multiplier: multiplier
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::var(VAR, format!("bad multiplier in '{}'", step)))?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AdmissionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tier_quota("anonymous"), 100);
    }

    #[test]
    fn test_from_vars_overrides() {
        let config = AdmissionConfig::from_vars([
            ("RATE_LIMIT_WINDOW_SECS", "60"),
            ("RATE_LIMIT_MAX_REQUESTS", "10"),
            ("RATE_LIMIT_TIER_PRO", "50"),
            ("RATE_LIMIT_ENDPOINTS", "POST /auth/login=900000:5:skip, /exports/*=60000:2"),
            ("RATE_LIMIT_ESCALATION", "3:2, 6:3"),
            ("RATE_LIMIT_BURST_ENABLED", "false"),
        ])
        .unwrap();

        assert_eq!(config.global.window, Duration::from_secs(60));
        assert_eq!(config.global.max_requests, 10);
        assert_eq!(config.tier_quota("pro"), 50);
        assert!(!config.burst.enabled);
        assert_eq!(config.endpoints.len(), 2);

        let login = &config.endpoints[0];
        assert_eq!(login.method.as_deref(), Some("POST"));
        assert_eq!(login.path, "/auth/login");
        assert_eq!(login.quota.window, Duration::from_millis(900_000));
        assert!(login.skip_successful);

        assert_eq!(
            config.escalation.steps,
            vec![
                EscalationStep {
                    threshold: 3,
                    penalty_multiplier: 2
                },
                EscalationStep {
                    threshold: 6,
                    penalty_multiplier: 3
                },
            ]
        );
    }

    #[test]
    fn test_from_vars_rejects_bad_values() {
        assert!(matches!(
            AdmissionConfig::from_vars([("RATE_LIMIT_MAX_REQUESTS", "lots")]),
            Err(ConfigError::InvalidVar { .. })
        ));
        assert!(AdmissionConfig::from_vars([("RATE_LIMIT_ENDPOINTS", "/a=10")]).is_err());
        assert!(
            AdmissionConfig::from_vars([("RATE_LIMIT_ENDPOINTS", "/a=10:1:later")])
                .is_err()
        );
    }

    #[test]
    fn test_from_vars_reads_custom_tiers() {
        let config = AdmissionConfig::from_vars([("RATE_LIMIT_TIER_GOLD", "7")]).unwrap();
        assert_eq!(config.tiers.quotas.get("gold"), Some(&7));
        assert_eq!(config.tier_quota("pro"), 2000);

        assert!(AdmissionConfig::from_vars([("RATE_LIMIT_TIER_GOLD", "many")]).is_err());
    }

    #[test]
    fn test_from_vars_flags() {
        let config = AdmissionConfig::from_vars([
            ("RATE_LIMIT_ENABLED", "0"),
            ("RATE_LIMIT_BURST_ENABLED", "yes"),
        ])
        .unwrap();
        assert!(!config.enabled);
        assert!(config.burst.enabled);

        assert!(matches!(
            AdmissionConfig::from_vars([("RATE_LIMIT_ENABLED", "sometimes")]),
            Err(ConfigError::InvalidVar { .. })
        ));
    }

    #[test]
    fn test_validate_escalation_order() {
        let mut config = AdmissionConfig::default();
        config.escalation.steps = vec![
            EscalationStep {
                threshold: 10,
                penalty_multiplier: 2,
            },
            EscalationStep {
                threshold: 5,
                penalty_multiplier: 4,
            },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_burst_and_tiers() {
        let mut config = AdmissionConfig::default();
        config.burst.initial_tokens = 30.0;
        assert!(config.validate().is_err());

        let mut config = AdmissionConfig::default();
        config.tiers.fallback_tier = "platinum".into();
        assert!(config.validate().is_err());

        let mut config = AdmissionConfig::default();
        config
            .tiers
            .role_tiers
            .insert("editor".into(), "missing".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_override_matching() {
        let config = AdmissionConfig {
            endpoints: vec![
                EndpointOverride::new("/auth/login", Duration::from_secs(900), 5).with_method("post"),
                EndpointOverride::new("/exports/*", Duration::from_secs(60), 2),
                EndpointOverride::new("/exports/invoices/*", Duration::from_secs(60), 1),
            ],
            ..AdmissionConfig::default()
        };

        let login = config.endpoint_override("POST", "/auth/login/").unwrap();
        assert_eq!(login.path, "/auth/login");
        assert!(config.endpoint_override("GET", "/auth/login").is_none());

        let export = config.endpoint_override("GET", "/exports/invoices/7").unwrap();
        assert_eq!(export.path, "/exports/invoices/*");
        let export = config.endpoint_override("GET", "/exports/deals").unwrap();
        assert_eq!(export.path, "/exports/*");

        assert!(config.endpoint_override("GET", "/deals").is_none());
    }
}

//! Tracing subscriber setup: log formatting plus operator alerts.

use std::time::Duration;

use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use dealflow_core::env::parse_flag;

use crate::observability::{AlertConfig, AlertLayer};

const DEFAULT_FILTER: &str = "info,api_server=debug,dealflow_admission=debug,dealflow_infra=debug";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertTarget {
    Disabled,
    Stderr,
    Webhook(String),
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub format: LogFormat,
    pub service_name: String,
    pub alerts: AlertTarget,
    pub alert_cooldown: Duration,
}

impl TelemetryConfig {
    /// Reads `LOG_FORMAT`, `SERVICE_NAME`, `ALERTS_ENABLED`,
    /// `ALERT_WEBHOOK_URL` and `ALERT_COOLDOWN_SECS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let format = match var("LOG_FORMAT").map(|v| v.to_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let enabled = var("ALERTS_ENABLED")
            .and_then(|v| parse_flag(&v))
            .unwrap_or(true);
        let alerts = match var("ALERT_WEBHOOK_URL").filter(|url| !url.is_empty()) {
            _ if !enabled => AlertTarget::Disabled,
            Some(url) => AlertTarget::Webhook(url),
            None => AlertTarget::Stderr,
        };

        let alert_cooldown = var("ALERT_COOLDOWN_SECS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| AlertConfig::default().cooldown);

        Self {
            format,
            service_name: var("SERVICE_NAME").unwrap_or_else(|| "dealflow-api".to_string()),
            alerts,
            alert_cooldown,
        }
    }

    fn alert_layer(&self) -> Option<AlertLayer> {
        let config = AlertConfig {
            cooldown: self.alert_cooldown,
            ..AlertConfig::default()
        };
        match &self.alerts {
            AlertTarget::Disabled => None,
            AlertTarget::Stderr => Some(AlertLayer::console(config)),
            AlertTarget::Webhook(url) => Some(AlertLayer::webhook(
                url.clone(),
                self.service_name.clone(),
                config,
            )),
        }
    }
}

/// Install the global subscriber. Call once, inside the runtime.
pub fn init_telemetry(config: &TelemetryConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().pretty().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(config.alert_layer())
        .init();

    tracing::info!(
        service = %config.service_name,
        format = ?config.format,
        alerts = ?config.alerts,
        "Telemetry initialized"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> TelemetryConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        TelemetryConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]);
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.alerts, AlertTarget::Stderr);
        assert_eq!(config.service_name, "dealflow-api");
        assert_eq!(config.alert_cooldown, Duration::from_secs(60));
    }

    #[test]
    fn test_webhook_and_disable() {
        let config = load(&[
            ("LOG_FORMAT", "JSON"),
            ("ALERT_WEBHOOK_URL", "https://hooks.example.com/x"),
            ("ALERT_COOLDOWN_SECS", "5"),
        ]);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(
            config.alerts,
            AlertTarget::Webhook("https://hooks.example.com/x".to_string())
        );
        assert_eq!(config.alert_cooldown, Duration::from_secs(5));

        let config = load(&[
            ("ALERTS_ENABLED", "false"),
            ("ALERT_WEBHOOK_URL", "https://hooks.example.com/x"),
        ]);
        assert_eq!(config.alerts, AlertTarget::Disabled);
    }

    #[test]
    fn test_alert_flag_spellings() {
        assert_eq!(load(&[("ALERTS_ENABLED", "off")]).alerts, AlertTarget::Disabled);
        assert_eq!(load(&[("ALERTS_ENABLED", "No")]).alerts, AlertTarget::Disabled);
        assert_eq!(load(&[("ALERTS_ENABLED", "1")]).alerts, AlertTarget::Stderr);
    }
}

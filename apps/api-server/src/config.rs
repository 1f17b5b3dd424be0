//! Application configuration loaded from environment variables.

use std::env;

use dealflow_admission::{AdmissionConfig, ConfigError};
use dealflow_core::env::parse_flag;
use dealflow_infra::JwtConfig;

#[cfg(feature = "redis")]
use dealflow_infra::RedisConfig;

use crate::middleware::admission::AdmissionOptions;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub admission: AdmissionConfig,
    pub admission_options: AdmissionOptions,
    pub jwt: JwtConfig,
    #[cfg(feature = "redis")]
    pub redis: RedisConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let admission_options = AdmissionOptions {
            key_header: env::var("RATE_LIMIT_KEY_HEADER")
                .ok()
                .filter(|h| !h.trim().is_empty()),
            trust_forwarded: env::var("TRUST_FORWARDED_HEADERS")
                .ok()
                .and_then(|v| parse_flag(&v))
                .unwrap_or(false),
            exempt_paths: Self::parse_exempt_paths(),
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            admission: AdmissionConfig::from_env()?,
            admission_options,
            jwt: JwtConfig::from_env(),
            #[cfg(feature = "redis")]
            redis: RedisConfig::from_env(),
        })
    }

    /// Parse exempt paths from `RATE_LIMIT_EXEMPT_PATHS`.
    /// Format: comma-separated paths, e.g. `/api/health,/api/metrics`
    fn parse_exempt_paths() -> Vec<String> {
        match env::var("RATE_LIMIT_EXEMPT_PATHS") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
            Err(_) => vec!["/api/health".to_string()],
        }
    }
}

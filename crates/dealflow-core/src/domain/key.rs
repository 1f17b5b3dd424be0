use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The caller part of a rate-limit key.
///
/// Rendered as `<kind>:<value>`, e.g. `user:42` or `ip:203.0.113.9`. The same
/// text is accepted back by [`FromStr`], which is how operator tooling names a
/// caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// Explicit key supplied by the caller of the admission layer.
    Override(String),
    User(String),
    ApiCredential(String),
    Address(String),
}

impl Identifier {
    pub fn kind(&self) -> &'static str {
        match self {
            Identifier::Override(_) => "key",
            Identifier::User(_) => "user",
            Identifier::ApiCredential(_) => "api",
            Identifier::Address(_) => "ip",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Identifier::Override(v)
            | Identifier::User(v)
            | Identifier::ApiCredential(v)
            | Identifier::Address(v) => v,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.value())
    }
}

impl FromStr for Identifier {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| DomainError::InvalidKey(format!("missing kind prefix in '{}'", s)))?;

        if value.is_empty() {
            return Err(DomainError::InvalidKey(format!("empty identifier in '{}'", s)));
        }

        let value = value.to_string();
        match kind {
            "key" => Ok(Identifier::Override(value)),
            "user" => Ok(Identifier::User(value)),
            "api" => Ok(Identifier::ApiCredential(value)),
            "ip" => Ok(Identifier::Address(value)),
            other => Err(DomainError::InvalidKey(format!(
                "unknown identifier kind '{}'",
                other
            ))),
        }
    }
}

impl Serialize for Identifier {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Which quota a counter belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "name", rename_all = "snake_case")]
pub enum Scope {
    Global,
    Tier(String),
    Endpoint(String),
}

impl Scope {
    /// Short label used in logs and rejection messages.
    pub fn label(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Tier(_) => "tier",
            Scope::Endpoint(_) => "endpoint",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Tier(name) => write!(f, "tier:{}", name),
            Scope::Endpoint(path) => write!(f, "endpoint:{}", path),
        }
    }
}

/// A composite rate-limit identity: one caller within one quota scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateLimitKey {
    pub scope: Scope,
    pub identifier: Identifier,
}

impl RateLimitKey {
    pub fn new(scope: Scope, identifier: Identifier) -> Self {
        Self { scope, identifier }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.scope, self.identifier)
    }
}

//! Tier classification.

use dealflow_core::domain::CallerIdentity;

use crate::config::TierConfig;

/// Tier assigned to callers with no identity.
pub const ANONYMOUS_TIER: &str = "anonymous";

/// Maps caller metadata onto a configured quota tier.
///
/// Users are looked up by role, then subscription, then account type. The first
/// of a user's roles that has a tier mapping wins. Anything
/// that matches no table, or names a tier without a quota, gets the fallback
/// tier.
#[derive(Debug, Clone)]
pub struct TierClassifier {
    config: TierConfig,
}

impl TierClassifier {
    pub fn new(config: TierConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, caller: &CallerIdentity) -> String {
        let tier = match caller {
            CallerIdentity::Anonymous => Some(ANONYMOUS_TIER),
            CallerIdentity::ApiCredential(credential) => credential
                .tier
                .as_deref()
                .and_then(|t| self.known(t))
                .or(Some(self.config.api_credential_tier.as_str())),
            CallerIdentity::AuthenticatedUser(user) => {
                user.roles
                    .iter()
                    .find_map(|role| lookup(&self.config.role_tiers, Some(role)))
                    .or_else(|| {
                        lookup(
                            &self.config.subscription_tiers,
                            user.subscription_tier.as_deref(),
                        )
                    })
                    .or_else(|| {
                        lookup(&self.config.account_type_tiers, user.account_type.as_deref())
                    })
            }
        };

        tier.and_then(|t| self.known(t))
            .unwrap_or(self.config.fallback_tier.as_str())
            .to_string()
    }

    fn known<'a>(&'a self, tier: &str) -> Option<&'a str> {
        let tier = tier.trim().to_ascii_lowercase();
        self.config
            .quotas
            .get_key_value(tier.as_str())
            .map(|(name, _)| name.as_str())
    }
}

fn lookup<'a>(
    table: &'a std::collections::HashMap<String, String>,
    value: Option<&str>,
) -> Option<&'a str> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    table
        .get(value)
        .or_else(|| table.get(&value.to_ascii_lowercase()))
        .map(String::as_str)
}

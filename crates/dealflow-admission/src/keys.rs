//! Key resolution and the store key layout.

use dealflow_core::domain::{CallerIdentity, Identifier, RateLimitKey};
use dealflow_core::ports::escape_pattern;

use crate::request::AdmissionRequest;

/// Address used when the transport reports none.
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// Picks the identity a request is counted against.
///
/// Priority: explicit override, authenticated user, API credential, network
/// address. Pure; the same request resolves the same way on every instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyResolver;

impl KeyResolver {
    pub fn resolve(&self, request: &AdmissionRequest) -> Identifier {
        if let Some(key) = request.key_override.as_deref().filter(|k| !k.is_empty()) {
            return Identifier::Override(key.to_string());
        }

        match &request.caller {
            CallerIdentity::AuthenticatedUser(user) => Identifier::User(user.user_id.clone()),
            CallerIdentity::ApiCredential(credential) => {
                Identifier::ApiCredential(credential.credential_id.clone())
            }
            CallerIdentity::Anonymous => Identifier::Address(
                request
                    .address
                    .as_deref()
                    .filter(|a| !a.is_empty())
                    .unwrap_or(UNKNOWN_ADDRESS)
                    .to_string(),
            ),
        }
    }
}

/// Store key layout under a common prefix.
///
/// Every key of one identifier carries the same `{...}` hash tag so they land
/// in one Redis Cluster slot.
#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn window(&self, key: &RateLimitKey) -> String {
        format!("{}:win:{}:{}", self.prefix, tag(&key.identifier), key.scope)
    }

    /// Pattern covering every window counter of an identifier.
    pub fn window_pattern(&self, identifier: &Identifier) -> String {
        format!(
            "{}:win:{}:*",
            escape_pattern(&self.prefix),
            escape_pattern(&tag(identifier))
        )
    }

    pub fn bucket(&self, identifier: &Identifier) -> String {
        format!("{}:bucket:{}", self.prefix, tag(identifier))
    }

    pub fn violations(&self, identifier: &Identifier) -> String {
        format!("{}:violations:{}", self.prefix, tag(identifier))
    }

    pub fn block(&self, identifier: &Identifier) -> String {
        format!("{}:block:{}", self.prefix, tag(identifier))
    }

    pub fn whitelist(&self, identifier: &Identifier) -> String {
        format!("{}:whitelist:{}", self.prefix, tag(identifier))
    }

    /// Set of blocked identifiers, for listing.
    pub fn blocked_set(&self) -> String {
        format!("{}:blocked", self.prefix)
    }

    /// Set of whitelisted identifiers, for listing.
    pub fn whitelisted_set(&self) -> String {
        format!("{}:whitelisted", self.prefix)
    }
}

/// Hash tag of an identifier. `%`, `{` and `}` are percent-encoded so the
/// tag stays well formed and distinct identifiers never share a tag.
fn tag(identifier: &Identifier) -> String {
    let raw = identifier.to_string();
    let mut tag = String::with_capacity(raw.len() + 2);
    tag.push('{');
    for c in raw.chars() {
        match c {
            '%' => tag.push_str("%25"),
            '{' => tag.push_str("%7B"),
            '}' => tag.push_str("%7D"),
            c => tag.push(c),
        }
    }
    tag.push('}');
    tag
}

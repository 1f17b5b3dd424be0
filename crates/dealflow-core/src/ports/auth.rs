//! Authentication port - the session layer's view of a caller.

use crate::domain::{ApiCredential, CallerIdentity, UserProfile};

/// What a bearer token says about its holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    /// User id, or the owning account for API credentials.
    pub subject: String,
    pub roles: Vec<String>,
    pub account_type: Option<String>,
    pub subscription_tier: Option<String>,
    /// Set when the token is an API credential rather than a user session.
    pub credential_id: Option<String>,
}

impl TokenSubject {
    pub fn user(subject: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            subject: subject.into(),
            roles,
            account_type: None,
            subscription_tier: None,
            credential_id: None,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Map the token onto the identity used for admission control.
    pub fn caller_identity(&self) -> CallerIdentity {
        match &self.credential_id {
            Some(credential_id) => CallerIdentity::ApiCredential(ApiCredential {
                credential_id: credential_id.clone(),
                tier: self.subscription_tier.clone(),
            }),
            None => CallerIdentity::AuthenticatedUser(UserProfile {
                user_id: self.subject.clone(),
                roles: self.roles.clone(),
                account_type: self.account_type.clone(),
                subscription_tier: self.subscription_tier.clone(),
            }),
        }
    }
}

/// Decoded, validated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub subject: TokenSubject,
    pub exp: i64,
}

/// Token service trait for JWT operations.
pub trait TokenService: Send + Sync {
    /// Issue a token for a subject.
    fn generate_token(&self, subject: &TokenSubject) -> Result<String, AuthError>;

    /// Validate and decode a token.
    fn validate_token(&self, token: &str) -> Result<TokenClaims, AuthError>;

    fn expiration_seconds(&self) -> i64;
}

/// Authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Missing authorization header")]
    MissingAuth,

    #[error("Insufficient permissions")]
    InsufficientPermissions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_token_identity() {
        let mut subject = TokenSubject::user("u-7", vec!["agency_admin".into(), "user".into()]);
        subject.subscription_tier = Some("pro".into());

        match subject.caller_identity() {
            CallerIdentity::AuthenticatedUser(profile) => {
                assert_eq!(profile.user_id, "u-7");
                assert_eq!(profile.roles, vec!["agency_admin".to_string(), "user".to_string()]);
                assert_eq!(profile.subscription_tier.as_deref(), Some("pro"));
            }
            other => panic!("unexpected identity {:?}", other),
        }
    }

    #[test]
    fn test_credential_token_identity() {
        let mut subject = TokenSubject::user("u-7", vec![]);
        subject.credential_id = Some("key_123".into());

        assert_eq!(
            subject.caller_identity(),
            CallerIdentity::ApiCredential(ApiCredential::new("key_123"))
        );
    }
}

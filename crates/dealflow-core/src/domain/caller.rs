use serde::{Deserialize, Serialize};

/// Metadata about an authenticated user, as supplied by the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    /// Every role the session carries, in the order the issuer listed them.
    #[serde(default)]
    pub roles: Vec<String>,
    pub account_type: Option<String>,
    pub subscription_tier: Option<String>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: Vec::new(),
            account_type: None,
            subscription_tier: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn with_account_type(mut self, account_type: impl Into<String>) -> Self {
        self.account_type = Some(account_type.into());
        self
    }

    pub fn with_subscription(mut self, tier: impl Into<String>) -> Self {
        self.subscription_tier = Some(tier.into());
        self
    }
}

/// An API credential presented instead of a user session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCredential {
    pub credential_id: String,
    /// Plan attached to the credential, if the issuer recorded one.
    pub tier: Option<String>,
}

impl ApiCredential {
    pub fn new(credential_id: impl Into<String>) -> Self {
        Self {
            credential_id: credential_id.into(),
            tier: None,
        }
    }
}

/// Who is calling.
///
/// Key resolution and tier classification match on this exhaustively, so a
/// request without a session is represented explicitly as `Anonymous`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallerIdentity {
    #[default]
    Anonymous,
    AuthenticatedUser(UserProfile),
    ApiCredential(ApiCredential),
}

impl CallerIdentity {
    /// Combine what the authentication layer produced for a request.
    ///
    /// A user session takes priority over an API credential.
    pub fn from_parts(user: Option<UserProfile>, credential: Option<ApiCredential>) -> Self {
        match (user, credential) {
            (Some(user), _) => CallerIdentity::AuthenticatedUser(user),
            (None, Some(credential)) => CallerIdentity::ApiCredential(credential),
            (None, None) => CallerIdentity::Anonymous,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, CallerIdentity::Anonymous)
    }
}

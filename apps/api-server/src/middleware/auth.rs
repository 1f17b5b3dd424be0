//! Authentication extractors and caller-identity resolution.

use actix_web::{FromRequest, HttpRequest, dev::Payload, http::header, http::header::HeaderMap};
use std::future::{Ready, ready};
use std::sync::Arc;

use dealflow_core::domain::CallerIdentity;
use dealflow_core::ports::{AuthError, TokenClaims, TokenService, TokenSubject};
use dealflow_shared::ErrorResponse;

/// Role required by the rate-limit admin API.
pub const ADMIN_ROLE: &str = "admin";

/// Authenticated caller extractor.
///
/// Use this in handlers to require authentication:
/// ```ignore
/// async fn protected_route(identity: Identity) -> impl Responder {
///     format!("Hello, {}!", identity.subject.subject)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Identity {
    pub subject: TokenSubject,
}

impl Identity {
    /// Check if the caller has a specific role.
    pub fn has_role(&self, role: &str) -> bool {
        self.subject.has_role(role)
    }

    pub fn require_role(&self, role: &str) -> Result<(), AuthenticationError> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(AuthenticationError(AuthError::InsufficientPermissions))
        }
    }
}

impl From<TokenClaims> for Identity {
    fn from(claims: TokenClaims) -> Self {
        Self {
            subject: claims.subject,
        }
    }
}

/// Error type for authentication failures.
#[derive(Debug)]
pub struct AuthenticationError(pub AuthError);

impl std::fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl actix_web::ResponseError for AuthenticationError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        match &self.0 {
            AuthError::TokenExpired | AuthError::InvalidToken(_) | AuthError::MissingAuth => {
                actix_web::http::StatusCode::UNAUTHORIZED
            }
            AuthError::InsufficientPermissions => actix_web::http::StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        let error = match &self.0 {
            AuthError::TokenExpired => ErrorResponse::new(401, "Token Expired")
                .with_detail("Your authentication token has expired. Please login again."),
            AuthError::InvalidToken(msg) => {
                ErrorResponse::new(401, "Invalid Token").with_detail(msg.clone())
            }
            AuthError::MissingAuth => ErrorResponse::new(401, "Authentication Required")
                .with_detail("Please provide a valid Bearer token in the Authorization header."),
            AuthError::InsufficientPermissions => ErrorResponse::forbidden(),
        };

        actix_web::HttpResponse::build(self.status_code()).json(error)
    }
}

/// Pull the bearer token out of the `Authorization` header.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuth)?;

    let value = value
        .to_str()
        .map_err(|_| AuthError::InvalidToken("Invalid authorization header".to_string()))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::InvalidToken("Expected Bearer token".to_string()))
}

/// Caller identity used for admission control.
///
/// Never fails: a missing, expired or invalid token means an anonymous caller.
pub fn caller_identity(headers: &HeaderMap, tokens: &dyn TokenService) -> CallerIdentity {
    match bearer_token(headers).and_then(|token| tokens.validate_token(token)) {
        Ok(claims) => claims.subject.caller_identity(),
        Err(AuthError::MissingAuth) => CallerIdentity::Anonymous,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unusable bearer token for admission");
            CallerIdentity::Anonymous
        }
    }
}

impl FromRequest for Identity {
    type Error = AuthenticationError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        // Get token service from app data
        let token_service = match req.app_data::<actix_web::web::Data<Arc<dyn TokenService>>>() {
            Some(service) => service,
            None => {
                tracing::error!("TokenService not found in app data");
                return ready(Err(AuthenticationError(AuthError::InvalidToken(
                    "Server configuration error".to_string(),
                ))));
            }
        };

        let result = bearer_token(req.headers())
            .and_then(|token| token_service.validate_token(token))
            .map(Identity::from)
            .map_err(AuthenticationError);

        ready(result)
    }
}

//! Rate-limit administration handlers. All routes require the admin role.

use actix_web::{HttpResponse, web};
use std::time::Duration;

use dealflow_core::domain::{BlockRecord, Identifier, RateLimitStatus, WhitelistEntry};
use dealflow_shared::ApiResponse;
use dealflow_shared::dto::{
    ActiveLimitResponse, BlockRequest, BlockResponse, RateLimitListResponse,
    RateLimitStatusResponse, ResetResponse, WhitelistRequest, WhitelistResponse,
};

use crate::middleware::auth::{ADMIN_ROLE, AuthenticationError, Identity};
use crate::middleware::error::{AppError, AppResult};
use crate::state::AppState;

const MANUAL_BLOCK_REASON: &str = "Manual block";

fn parse_key(raw: &str) -> AppResult<Identifier> {
    Ok(raw.parse::<Identifier>()?)
}

fn require_admin(identity: &Identity) -> Result<(), actix_web::Error> {
    identity.require_role(ADMIN_ROLE).map_err(|e: AuthenticationError| {
        tracing::warn!(subject = %identity.subject.subject, "Rate-limit admin access denied");
        e.into()
    })
}

fn whitelist_response(identifier: &Identifier, entry: WhitelistEntry) -> WhitelistResponse {
    WhitelistResponse {
        key: identifier.to_string(),
        added_at: entry.added_at,
        permanent: entry.is_permanent(),
        expires_at: entry.expires_at,
    }
}

fn block_response(identifier: &Identifier, record: BlockRecord) -> BlockResponse {
    BlockResponse {
        key: identifier.to_string(),
        reason: record.reason,
        blocked_at: record.blocked_at,
        expires_at: record.expires_at,
    }
}

fn status_response(status: RateLimitStatus) -> RateLimitStatusResponse {
    let identifier = status.identifier;
    RateLimitStatusResponse {
        key: identifier.to_string(),
        blocked: status.blocked,
        block: status.block.map(|b| block_response(&identifier, b)),
        whitelisted: status.whitelisted,
        whitelist: status.whitelist.map(|w| whitelist_response(&identifier, w)),
        violations: status.violations,
        active_limits: status
            .active_limits
            .into_iter()
            .map(|l| ActiveLimitResponse {
                scope: l.scope,
                count: l.count,
                limit: l.limit,
                reset_after_seconds: l.reset_after_secs,
            })
            .collect(),
    }
}

/// GET /api/admin/rate-limits
pub async fn list(state: web::Data<AppState>, identity: Identity) -> actix_web::Result<HttpResponse> {
    require_admin(&identity)?;

    let whitelisted = state
        .pipeline
        .list_whitelisted()
        .await
        .map_err(AppError::from)?;
    let blocked = state
        .pipeline
        .list_blocked()
        .await
        .map_err(AppError::from)?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(RateLimitListResponse {
        whitelisted: whitelisted
            .into_iter()
            .map(|(id, entry)| whitelist_response(&id, entry))
            .collect(),
        blocked: blocked
            .into_iter()
            .map(|(id, record)| block_response(&id, record))
            .collect(),
    })))
}

/// GET /api/admin/rate-limits/{key}
pub async fn status(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<String>,
) -> actix_web::Result<HttpResponse> {
    require_admin(&identity)?;
    let identifier = parse_key(&path)?;

    let status = state
        .pipeline
        .status(&identifier)
        .await
        .map_err(AppError::from)?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(status_response(status))))
}

/// DELETE /api/admin/rate-limits/{key}
pub async fn reset(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<String>,
) -> actix_web::Result<HttpResponse> {
    require_admin(&identity)?;
    let identifier = parse_key(&path)?;

    let outcome = state
        .pipeline
        .reset(&identifier)
        .await
        .map_err(AppError::from)?;
    tracing::info!(admin = %identity.subject.subject, key = %identifier, "Rate limits reset by admin");

    Ok(HttpResponse::Ok().json(ApiResponse::ok(ResetResponse {
        key: identifier.to_string(),
        windows_cleared: outcome.windows_cleared,
        violations_cleared: outcome.violations_cleared,
        block_cleared: outcome.block_cleared,
    })))
}

/// PUT /api/admin/rate-limits/{key}/whitelist
pub async fn whitelist_add(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<String>,
    body: Option<web::Json<WhitelistRequest>>,
) -> actix_web::Result<HttpResponse> {
    require_admin(&identity)?;
    let identifier = parse_key(&path)?;
    let duration = body
        .and_then(|b| b.into_inner().duration_seconds)
        .map(Duration::from_secs);

    let entry = state
        .pipeline
        .whitelist_add(&identifier, duration)
        .await
        .map_err(AppError::from)?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(whitelist_response(&identifier, entry))))
}

/// DELETE /api/admin/rate-limits/{key}/whitelist
pub async fn whitelist_remove(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<String>,
) -> actix_web::Result<HttpResponse> {
    require_admin(&identity)?;
    let identifier = parse_key(&path)?;

    let removed = state
        .pipeline
        .whitelist_remove(&identifier)
        .await
        .map_err(AppError::from)?;
    if !removed {
        return Err(AppError::NotFound(format!("{} is not whitelisted", identifier)).into());
    }

    Ok(HttpResponse::NoContent().finish())
}

/// PUT /api/admin/rate-limits/{key}/block
pub async fn block(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<String>,
    body: web::Json<BlockRequest>,
) -> actix_web::Result<HttpResponse> {
    require_admin(&identity)?;
    let identifier = parse_key(&path)?;
    let req = body.into_inner();
    let reason = req
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| MANUAL_BLOCK_REASON.to_string());

    let record = state
        .pipeline
        .block(&identifier, Duration::from_secs(req.duration_seconds), &reason)
        .await
        .map_err(AppError::from)?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(block_response(&identifier, record))))
}

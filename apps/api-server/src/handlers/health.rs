//! Health check endpoint.

use actix_web::{HttpResponse, web};
use dealflow_shared::dto::{HealthResponse, StoreHealth};

use crate::state::AppState;

/// Health check endpoint - returns server status and counter store reachability.
///
/// An unreachable store reports `degraded` with 200: admission fails open, so
/// the instance still serves traffic.
///
/// GET /api/health
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let store = state.pipeline.store();
    let reachable = match store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(backend = store.backend(), error = %e, "Counter store health check failed");
            false
        }
    };

    HttpResponse::Ok().json(HealthResponse {
        status: if reachable { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: StoreHealth {
            backend: store.backend().to_string(),
            reachable,
        },
    })
}

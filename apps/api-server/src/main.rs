//! # Dealflow API Server
//!
//! Actix-web entry point. Every request passes the admission pipeline before
//! reaching a handler.

use actix_web::{App, HttpServer, web};
use anyhow::Context;
use tracing_actix_web::TracingLogger;

mod config;
mod handlers;
mod middleware;
mod observability;
mod state;
mod telemetry;

use config::AppConfig;
use middleware::admission::AdmissionMiddleware;
use observability::RequestIdMiddleware;
use state::AppState;
use telemetry::{TelemetryConfig, init_telemetry};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_telemetry(&TelemetryConfig::from_env());

    let config = AppConfig::from_env().context("invalid rate limit configuration")?;

    tracing::info!(
        "Starting Dealflow API Server on {}:{}",
        config.host,
        config.port
    );

    let state = AppState::new(&config)
        .await
        .context("failed to initialize counter store")?;

    let options = config.admission_options.clone();
    HttpServer::new(move || {
        App::new()
            // Innermost first: admission runs inside the request-id span
            .wrap(AdmissionMiddleware::new(
                state.pipeline.clone(),
                state.tokens.clone(),
                options.clone(),
            ))
            .wrap(RequestIdMiddleware)
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .app_data(web::Data::new(state.tokens.clone()))
            .configure(handlers::configure_routes)
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?
    .run()
    .await
    .context("server error")?;

    Ok(())
}

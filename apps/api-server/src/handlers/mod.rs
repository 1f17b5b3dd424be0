//! HTTP handlers and route configuration.

mod admin;
mod health;

use actix_web::web;

/// Configure all application routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            // Public routes
            .route("/health", web::get().to(health::health_check))
            // Rate-limit administration
            .service(
                web::scope("/admin/rate-limits")
                    .route("", web::get().to(admin::list))
                    .route("/{key}", web::get().to(admin::status))
                    .route("/{key}", web::delete().to(admin::reset))
                    .route("/{key}/whitelist", web::put().to(admin::whitelist_add))
                    .route("/{key}/whitelist", web::delete().to(admin::whitelist_remove))
                    .route("/{key}/block", web::put().to(admin::block)),
            ),
    );
}

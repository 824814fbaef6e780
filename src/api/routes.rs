// API route configuration

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check
        .route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        .service(
            web::scope("/api")
                // Library reads
                .route("/games", web::get().to(handlers::list_games))
                .route("/games", web::post().to(handlers::create_game))
                .route("/games/{id}", web::get().to(handlers::get_game))
                .route("/games/{id}/resync", web::post().to(handlers::resync_game))
                .route("/stats", web::get().to(handlers::get_stats))
                // Catalog search
                .route("/search/{source}", web::get().to(handlers::search_catalog))
                // Storefront import (two-phase)
                .route("/import/open", web::post().to(handlers::import_open))
                .route("/import/run", web::post().to(handlers::import_run))
                // Batch enrichment
                .route("/sync/{source}", web::post().to(handlers::start_sync))
                // Task polling
                .route(
                    "/tasks/{category}/status",
                    web::get().to(handlers::task_status),
                )
                .route(
                    "/tasks/{category}/clear",
                    web::post().to(handlers::task_clear),
                ),
        );
}

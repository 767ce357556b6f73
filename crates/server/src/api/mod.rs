//! API module providing the gateway's HTTP endpoints.
//!
//! This module is organized into submodules:
//! - `notify` - Webhook fan-out endpoint (/api/notify)
//! - `subscriptions` - Browser subscription management (/api/subscription*)
//! - `channels` - Channel administration (/api/channels)
//! - `templates` - Notification template administration (/api/templates)
//! - `schedule` - Deferred/recurring notifications (/api/schedule)
//! - `cron` - Externally triggered scheduler sweep (/api/cron/*)
//! - `notifications` - Notification history (/api/notifications)
//! - `stats` - Delivery statistics (/api/stats)
//! - `health` - Health check endpoint (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration

pub mod channels;
pub mod cron;
pub mod health;
pub mod notifications;
pub mod notify;
pub mod openapi;
pub mod schedule;
pub mod stats;
pub mod subscriptions;
pub mod templates;

use crate::AppResources;
use crate::config::SecurityConfig;
use crate::security;
use axum::http::{HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_redoc::{Redoc, Servable};

/// Build the CORS layer from the configured origin/method policy. A `*`
/// origin entry means any origin; otherwise matching is set-membership.
pub fn cors_layer(config: &SecurityConfig) -> CorsLayer {
    let origins = if config.cors_allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            config
                .cors_allowed_origins
                .iter()
                .filter_map(|o| o.parse::<HeaderValue>().ok()),
        )
    };
    let methods: Vec<Method> = config
        .cors_allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .max_age(Duration::from_secs(86400))
}

/// Assemble the full application router. Everything under `/api` passes the
/// admission gate; the health endpoint does not.
pub fn build_router(resources: AppResources) -> axum::Router {
    let gated = OpenApiRouter::new()
        .merge(notify::router())
        .merge(subscriptions::router())
        .merge(channels::router())
        .merge(templates::router())
        .merge(schedule::router())
        .merge(cron::router())
        .merge(notifications::router())
        .merge(stats::router())
        .layer(axum::middleware::from_fn(security::admission_middleware));

    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .merge(gated)
        .routes(routes!(health::health))
        .layer(axum::Extension(resources.clone()))
        .layer(cors_layer(&resources.config.security))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::map_response(security::security_headers))
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip(resources))]
pub async fn start_webserver(resources: AppResources) -> color_eyre::Result<()> {
    let router = build_router(resources);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    tracing::info!(
        name = "api.server_started",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        addr = "0.0.0.0:8080",
        message = "Server running"
    );
    axum::serve(listener, router)
        .await
        .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}

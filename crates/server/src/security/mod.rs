//! Request admission gate: client identification, IP filtering, fixed-window
//! rate limiting, webhook signature verification and the security event log.
//!
//! Every inbound request to a protected endpoint passes through
//! [`admission_middleware`] before business logic runs. CORS negotiation is
//! handled by the `tower-http` layer assembled in [`crate::api`].

pub mod client_ip;
pub mod ip_filter;
pub mod log;
pub mod rate_limit;
pub mod signature;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::AppResources;
use crate::error::ApiError;
use crate::security::client_ip::client_identifier;
use crate::security::ip_filter::IpFilter;
use crate::security::log::SecurityEvent;

/// Axum middleware applying the IP filter and the rate limiter to every
/// request, denies emitting a security log entry before the error returns.
pub async fn admission_middleware(request: Request, next: Next) -> Response {
    let Some(resources) = request.extensions().get::<AppResources>().cloned() else {
        tracing::error!(
            name = "security.admission.missing_resources",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            message = "AppResources not found in request extensions"
        );
        return ApiError::Internal(sea_orm::DbErr::Custom("missing app resources".into()))
            .into_response();
    };

    let ip = client_identifier(request.headers());
    let event = SecurityEvent::from_request(&request, &ip);

    let filter = IpFilter::from_config(&resources.config.security);
    if let Err(reason) = filter.check(&ip) {
        resources
            .security_log
            .record(event.with_event("IP_BLOCKED").with_details(json!(reason)))
            .await;
        return ApiError::Forbidden(reason).into_response();
    }

    let decision = resources.limiter.check(&ip).await;
    if !decision.allowed {
        resources
            .security_log
            .record(
                event
                    .with_event("RATE_LIMIT_EXCEEDED")
                    .with_status(429)
                    .with_details(json!({
                        "limit": decision.limit,
                        "resetTime": decision.reset_at
                            .format(&time::format_description::well_known::Rfc3339)
                            .unwrap_or_default(),
                    })),
            )
            .await;
        return ApiError::RateLimited {
            limit: decision.limit,
            remaining: decision.remaining,
            reset_at: decision.reset_at,
        }
        .into_response();
    }

    next.run(request).await
}

/// Append the baseline security headers to every response.
pub async fn security_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    if !headers.contains_key("X-Content-Type-Options") {
        headers.insert("X-Content-Type-Options", "nosniff".parse().unwrap());
    }
    if !headers.contains_key("X-Frame-Options") {
        headers.insert("X-Frame-Options", "DENY".parse().unwrap());
    }
    response
}

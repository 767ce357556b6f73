//! Externally triggered scheduler sweep.
//!
//! The gateway never spins its own timer loop for scheduled notifications;
//! a periodic invoker (system cron, a platform scheduler) calls this
//! endpoint with the cron secret instead.

use axum::Json;
use hyper::HeaderMap;
use serde_json::{Value, json};
use subtle::ConstantTimeEq;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::AppResources;
use crate::api::schedule::SCHEDULE_TAG;
use crate::error::ApiError;
use crate::scheduler;
use crate::security::client_ip::client_identifier;
use crate::security::log::SecurityEvent;

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new().routes(routes!(process_scheduled))
}

/// Run one scheduler sweep over all due pending notifications.
#[utoipa::path(
    get,
    path = "/api/cron/process-scheduled",
    tag = SCHEDULE_TAG,
    operation_id = "Process Scheduled Notifications",
    security(("Authorization" = [])),
    responses(
        (status = 200, description = "Sweep completed; processed counts fired rows", content_type = "application/json"),
        (status = 401, description = "Bad cron secret", content_type = "application/json")
    ),
)]
async fn process_scheduled(
    axum::Extension(resources): axum::Extension<AppResources>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .unwrap_or("");
    let expected = resources.config.effective_cron_secret();

    if !bool::from(token.as_bytes().ct_eq(expected.as_bytes())) {
        let ip = client_identifier(&headers);
        let user_agent = headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        resources
            .security_log
            .record(
                SecurityEvent::new(&ip, user_agent, "GET", "/api/cron/process-scheduled")
                    .with_event("AUTH_FAILED")
                    .with_status(401),
            )
            .await;
        return Err(ApiError::Unauthorized("Unauthorized".into()));
    }

    let processed = scheduler::process_due(&resources).await?;

    Ok(Json(json!({ "success": true, "processed": processed })))
}

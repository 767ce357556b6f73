//! The webhook fan-out endpoint.
//!
//! `POST /api/notify` accepts either a direct `{title, body, ...}` payload or
//! a `{templateId, variables, ...}` reference; the resolved payload fans out
//! to the authenticated scope's subscribers.

use axum::Json;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use hyper::{HeaderMap, StatusCode};
use sea_orm::EntityTrait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::AppResources;
use crate::auth::{Auth, BearerAuth};
use crate::dispatch::{self, NotificationPayload, PushAction};
use crate::entity::notification_template;
use crate::error::ApiError;
use crate::security::client_ip::client_identifier;
use crate::security::log::SecurityEvent;
use crate::security::signature::{SIGNATURE_HEADER, verify_signature};
use crate::templates::{self, TemplateVariable};

/// Tag for OpenAPI documentation.
pub const NOTIFY_TAG: &str = "Notify";

const MAX_TITLE_LEN: usize = 256;
const MAX_BODY_LEN: usize = 1024;

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new().routes(routes!(notify))
}

/// Request body for the notify endpoint. Either `templateId` or both
/// `title` and `body` must be present; explicit fields win over
/// template-rendered values.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    #[serde(default)]
    pub template_id: Option<i32>,
    #[serde(default)]
    pub variables: Option<HashMap<String, Value>>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub badge: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub actions: Option<Vec<PushAction>>,
    #[serde(default)]
    pub require_interaction: Option<bool>,
}

#[utoipa::path(
    post,
    path = "/api/notify",
    tag = NOTIFY_TAG,
    operation_id = "Send Notification",
    security(("Authorization" = [])),
    request_body = NotifyRequest,
    responses(
        (status = 200, description = "Fan-out performed; sentCount reflects accepted deliveries", content_type = "application/json"),
        (status = 400, description = "Invalid body or missing template variables", content_type = "application/json"),
        (status = 401, description = "Bad bearer token or webhook signature", content_type = "application/json"),
        (status = 404, description = "Referenced template missing or inactive", content_type = "application/json"),
        (status = 429, description = "Rate limited", content_type = "application/json"),
        (status = 500, description = "Unexpected error", content_type = "application/json")
    ),
)]
async fn notify(
    axum::Extension(resources): axum::Extension<AppResources>,
    BearerAuth(auth): BearerAuth,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match handle_notify(&resources, auth, &headers, &body).await {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        // The original deliberately echoes the message on this endpoint for
        // operator convenience; a known compromise, not a pattern to extend.
        Err(ApiError::Internal(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn handle_notify(
    resources: &AppResources,
    auth: Auth,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Value, ApiError> {
    verify_webhook_signature(resources, headers, body).await?;

    let request: NotifyRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))?;

    let payload = resolve_payload(resources, &auth, request).await?;

    let recipients = dispatch::load_recipients(resources, payload.channel_id).await?;
    let outcome = dispatch::dispatch(resources, &payload, &recipients).await;

    Ok(json!({
        "success": true,
        "channel": auth.describe(),
        "sentCount": outcome.delivered,
        "totalSubscriptions": outcome.total,
    }))
}

/// Enforce the webhook HMAC signature when a secret is configured. A deny
/// emits a security log entry before the error returns.
async fn verify_webhook_signature(
    resources: &AppResources,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<(), ApiError> {
    let Some(secret) = resources.config.webhook_secret_enabled() else {
        return Ok(());
    };

    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if provided.is_empty() || !verify_signature(secret, body, provided) {
        let ip = client_identifier(headers);
        let user_agent = headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        resources
            .security_log
            .record(
                SecurityEvent::new(&ip, user_agent, "POST", "/api/notify")
                    .with_event("INVALID_SIGNATURE")
                    .with_status(401),
            )
            .await;
        return Err(ApiError::Unauthorized("Invalid webhook signature".into()));
    }

    Ok(())
}

/// Resolve the request into a dispatchable payload: template expansion when
/// `templateId` is present, direct fields otherwise. Explicit request fields
/// win over template-rendered values, which win over absent.
async fn resolve_payload(
    resources: &AppResources,
    auth: &Auth,
    request: NotifyRequest,
) -> Result<NotificationPayload, ApiError> {
    let mut payload = match request.template_id {
        Some(template_id) => {
            let template = notification_template::Entity::find_by_id(template_id)
                .one(resources.db.as_ref())
                .await?
                .filter(|t| t.is_active)
                .ok_or_else(|| ApiError::NotFound("Template not found or inactive".into()))?;

            let schema: Vec<TemplateVariable> = template
                .variables
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| ApiError::BadRequest(format!("Corrupt template variables: {e}")))?
                .unwrap_or_default();

            let provided = request.variables.clone().unwrap_or_default();
            let outcome = templates::validate_variables(&provided, &schema);
            if !outcome.valid {
                return Err(ApiError::BadRequest(format!(
                    "Template variable validation failed: missing [{}], invalid [{}]",
                    outcome.missing.join(", "),
                    outcome.invalid.join(", ")
                )));
            }

            // Declared defaults fill absent variables before rendering.
            let mut variables = provided;
            for declared in &schema {
                if let Some(default) = &declared.default_value {
                    variables
                        .entry(declared.name.clone())
                        .or_insert_with(|| Value::String(default.clone()));
                }
            }

            let template_actions = template
                .actions
                .as_deref()
                .and_then(|json| serde_json::from_str::<Vec<PushAction>>(json).ok());

            NotificationPayload {
                channel_id: auth.channel_id().or(template.channel_id),
                title: templates::render(&template.title, &variables),
                body: templates::render(&template.body, &variables),
                icon: template
                    .icon
                    .as_deref()
                    .map(|v| templates::render(v, &variables)),
                image: template
                    .image
                    .as_deref()
                    .map(|v| templates::render(v, &variables)),
                badge: template
                    .badge
                    .as_deref()
                    .map(|v| templates::render(v, &variables)),
                url: template
                    .url
                    .as_deref()
                    .map(|v| templates::render(v, &variables)),
                actions: template_actions,
                require_interaction: None,
            }
        }
        None => NotificationPayload {
            channel_id: auth.channel_id(),
            ..Default::default()
        },
    };

    // Request-level overrides take precedence over template values.
    if let Some(title) = request.title {
        payload.title = title;
    }
    if let Some(body) = request.body {
        payload.body = body;
    }
    if request.icon.is_some() {
        payload.icon = request.icon;
    }
    if request.image.is_some() {
        payload.image = request.image;
    }
    if request.badge.is_some() {
        payload.badge = request.badge;
    }
    if request.url.is_some() {
        payload.url = request.url;
    }
    if request.actions.is_some() {
        payload.actions = request.actions;
    }
    if request.require_interaction.is_some() {
        payload.require_interaction = request.require_interaction;
    }

    if payload.title.is_empty() || payload.body.is_empty() {
        return Err(ApiError::BadRequest("Title and body are required".into()));
    }
    if payload.title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError::BadRequest(format!(
            "Title must be less than {MAX_TITLE_LEN} characters"
        )));
    }
    if payload.body.chars().count() > MAX_BODY_LEN {
        return Err(ApiError::BadRequest(format!(
            "Body must be less than {MAX_BODY_LEN} characters"
        )));
    }

    Ok(payload)
}

//! Scheduled notification endpoints: create, list and cancel.

use axum::Json;
use sea_orm::{ActiveModelTrait, ActiveValue, EntityTrait, QueryOrder};
use serde::Deserialize;
use serde_json::{Value, json};
use std::str::FromStr;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::AppResources;
use crate::dispatch::PushAction;
use crate::entity::scheduled_notification;
use crate::error::ApiError;
use crate::scheduler::RepeatPolicy;

/// Tag for OpenAPI documentation.
pub const SCHEDULE_TAG: &str = "Schedule";

const DEFAULT_TIMEZONE: &str = "Europe/Istanbul";

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new().routes(routes!(list_scheduled, create_scheduled, cancel_scheduled))
}

/// List all scheduled notifications, terminal ones included.
#[utoipa::path(
    get,
    path = "/api/schedule",
    tag = SCHEDULE_TAG,
    operation_id = "List Scheduled Notifications",
    responses(
        (status = 200, description = "All scheduled notifications", body = Vec<scheduled_notification::Model>, content_type = "application/json")
    ),
)]
async fn list_scheduled(
    axum::Extension(resources): axum::Extension<AppResources>,
) -> Result<Json<Vec<scheduled_notification::Model>>, ApiError> {
    let scheduled = scheduled_notification::Entity::find()
        .order_by_asc(scheduled_notification::Column::ScheduledAt)
        .all(resources.db.as_ref())
        .await?;
    Ok(Json(scheduled))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    #[serde(default)]
    pub channel_id: Option<i32>,
    pub title: String,
    pub body: String,
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
    /// RFC 3339 fire time, e.g. "2026-09-01T07:30:00Z".
    pub scheduled_at: String,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub repeat: Option<String>,
}

/// Create a scheduled notification in `pending` state.
#[utoipa::path(
    post,
    path = "/api/schedule",
    tag = SCHEDULE_TAG,
    operation_id = "Create Scheduled Notification",
    request_body = ScheduleRequest,
    responses(
        (status = 200, description = "Created; response carries the new id", content_type = "application/json"),
        (status = 400, description = "Missing fields or malformed fire time", content_type = "application/json")
    ),
)]
async fn create_scheduled(
    axum::Extension(resources): axum::Extension<AppResources>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.title.trim().is_empty() || request.body.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Title, body, and scheduledAt are required".into(),
        ));
    }
    let scheduled_at = OffsetDateTime::parse(&request.scheduled_at, &Rfc3339)
        .map_err(|_| ApiError::BadRequest("Scheduled time must be a valid ISO datetime".into()))?;
    let repeat = match request.repeat.as_deref() {
        None | Some("") => RepeatPolicy::None,
        Some(value) => RepeatPolicy::from_str(value)
            .map_err(|_| ApiError::BadRequest("Repeat must be none, daily, weekly or monthly".into()))?,
    };

    let actions = request
        .actions
        .as_ref()
        .map(|a| serde_json::to_string(a))
        .transpose()
        .map_err(|e| ApiError::BadRequest(format!("Invalid actions: {e}")))?;

    let model = scheduled_notification::ActiveModel {
        id: ActiveValue::NotSet,
        channel_id: ActiveValue::Set(request.channel_id),
        title: ActiveValue::Set(request.title.trim().to_string()),
        body: ActiveValue::Set(request.body.trim().to_string()),
        icon: ActiveValue::Set(request.icon),
        image: ActiveValue::Set(request.image),
        badge: ActiveValue::Set(request.badge),
        url: ActiveValue::Set(request.url),
        actions: ActiveValue::Set(actions),
        require_interaction: ActiveValue::Set(request.require_interaction),
        scheduled_at: ActiveValue::Set(scheduled_at),
        timezone: ActiveValue::Set(
            request
                .timezone
                .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        ),
        repeat: ActiveValue::Set(repeat.as_str().to_string()),
        status: ActiveValue::Set("pending".to_string()),
        created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
    };
    let inserted = model.insert(resources.db.as_ref()).await?;

    Ok(Json(json!({ "success": true, "id": inserted.id })))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelScheduleRequest {
    pub id: i32,
}

/// Cancel a scheduled notification. Cancellation is terminal: the sweep
/// never revisits a cancelled row.
#[utoipa::path(
    delete,
    path = "/api/schedule",
    tag = SCHEDULE_TAG,
    operation_id = "Cancel Scheduled Notification",
    request_body = CancelScheduleRequest,
    responses(
        (status = 200, description = "Cancelled", content_type = "application/json"),
        (status = 404, description = "No such scheduled notification", content_type = "application/json")
    ),
)]
async fn cancel_scheduled(
    axum::Extension(resources): axum::Extension<AppResources>,
    Json(request): Json<CancelScheduleRequest>,
) -> Result<Json<Value>, ApiError> {
    let scheduled = scheduled_notification::Entity::find_by_id(request.id)
        .one(resources.db.as_ref())
        .await?
        .ok_or_else(|| ApiError::NotFound("Scheduled notification not found".into()))?;

    let mut active: scheduled_notification::ActiveModel = scheduled.into();
    active.status = ActiveValue::Set("cancelled".to_string());
    active.update(resources.db.as_ref()).await?;

    Ok(Json(json!({ "success": true })))
}

//! Channel administration endpoints.

use axum::Json;
use hyper::HeaderMap;
use sea_orm::{ActiveModelTrait, ActiveValue, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Deserialize;
use serde_json::{Value, json};
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use uuid::Uuid;

use crate::AppResources;
use crate::entity::channel;
use crate::error::ApiError;
use crate::security::client_ip::client_identifier;
use crate::security::log::SecurityEvent;
use crate::templates::slugify;

/// Tag for OpenAPI documentation.
pub const CHANNELS_TAG: &str = "Channels";

const DEFAULT_COLOR: &str = "#3B82F6";
const DEFAULT_ICON: &str = "bell";

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new().routes(routes!(list_channels, create_channel, delete_channel))
}

fn generate_api_key() -> String {
    format!("spot_{}", Uuid::new_v4().simple())
}

/// List all channels, served through the channels cache namespace.
#[utoipa::path(
    get,
    path = "/api/channels",
    tag = CHANNELS_TAG,
    operation_id = "List Channels",
    responses(
        (status = 200, description = "All channels", body = Vec<channel::Model>, content_type = "application/json")
    ),
)]
async fn list_channels(
    axum::Extension(resources): axum::Extension<AppResources>,
) -> Result<Json<Vec<channel::Model>>, ApiError> {
    let db = resources.db.clone();
    let channels = resources
        .caches
        .channels
        .get_or_try_insert_with("all".to_string(), || async move {
            channel::Entity::find()
                .order_by_asc(channel::Column::Id)
                .all(db.as_ref())
                .await
        })
        .await?;
    Ok(Json(channels))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Create a channel: slug derived from the name, API key generated.
#[utoipa::path(
    post,
    path = "/api/channels",
    tag = CHANNELS_TAG,
    operation_id = "Create Channel",
    request_body = CreateChannelRequest,
    responses(
        (status = 200, description = "Channel created; response carries slug and API key", content_type = "application/json"),
        (status = 400, description = "Invalid channel name or color", content_type = "application/json"),
        (status = 409, description = "A channel with this name already exists", content_type = "application/json")
    ),
)]
async fn create_channel(
    axum::Extension(resources): axum::Extension<AppResources>,
    headers: HeaderMap,
    Json(request): Json<CreateChannelRequest>,
) -> Result<Json<Value>, ApiError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Channel name is required".into()));
    }
    if name.chars().count() > 64 {
        return Err(ApiError::BadRequest(
            "Channel name must be less than 64 characters".into(),
        ));
    }
    let color = request.color.unwrap_or_else(|| DEFAULT_COLOR.to_string());
    if !is_hex_color(&color) {
        return Err(ApiError::BadRequest(
            "Color must be a valid hex color".into(),
        ));
    }

    let slug = slugify(name);
    let existing = channel::Entity::find()
        .filter(channel::Column::Slug.eq(slug.clone()))
        .one(resources.db.as_ref())
        .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict(
            "A channel with this name already exists".into(),
        ));
    }

    let api_key = generate_api_key();
    let model = channel::ActiveModel {
        id: ActiveValue::NotSet,
        name: ActiveValue::Set(name.to_string()),
        slug: ActiveValue::Set(slug.clone()),
        api_key: ActiveValue::Set(api_key.clone()),
        color: ActiveValue::Set(color),
        icon: ActiveValue::Set(Some(
            request.icon.unwrap_or_else(|| DEFAULT_ICON.to_string()),
        )),
        is_active: ActiveValue::Set(true),
        created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
    };
    model.insert(resources.db.as_ref()).await?;

    resources.caches.channels.clear();

    resources
        .security_log
        .record(
            event_from(&headers, "POST", "/api/channels")
                .with_event("CHANNEL_CREATED")
                .with_details(json!({ "name": name, "slug": slug })),
        )
        .await;

    Ok(Json(json!({
        "success": true,
        "slug": slug,
        "apiKey": api_key,
    })))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteChannelRequest {
    pub id: i32,
}

/// Delete a channel by id.
///
/// Dependents are not cascaded: their channel reference is left dangling,
/// reported as "Global" by the read side.
#[utoipa::path(
    delete,
    path = "/api/channels",
    tag = CHANNELS_TAG,
    operation_id = "Delete Channel",
    request_body = DeleteChannelRequest,
    responses(
        (status = 200, description = "Channel deleted", content_type = "application/json"),
        (status = 404, description = "No such channel", content_type = "application/json")
    ),
)]
async fn delete_channel(
    axum::Extension(resources): axum::Extension<AppResources>,
    headers: HeaderMap,
    Json(request): Json<DeleteChannelRequest>,
) -> Result<Json<Value>, ApiError> {
    let result = channel::Entity::delete_by_id(request.id)
        .exec(resources.db.as_ref())
        .await?;
    if result.rows_affected == 0 {
        return Err(ApiError::NotFound("Channel not found".into()));
    }

    resources.caches.channels.clear();

    resources
        .security_log
        .record(
            event_from(&headers, "DELETE", "/api/channels")
                .with_event("CHANNEL_DELETED")
                .with_details(json!({ "id": request.id })),
        )
        .await;

    Ok(Json(json!({ "success": true })))
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

fn event_from(headers: &HeaderMap, method: &str, path: &str) -> SecurityEvent {
    let ip = client_identifier(headers);
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    SecurityEvent::new(&ip, user_agent, method, path)
}

//! Push subscription management endpoints.

use axum::Json;
use hyper::HeaderMap;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue, EntityTrait, QueryOrder};
use serde::Deserialize;
use serde_json::{Value, json};
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::AppResources;
use crate::entity::subscription;
use crate::error::ApiError;
use crate::security::client_ip::client_identifier;
use crate::security::log::SecurityEvent;

/// Tag for OpenAPI documentation.
pub const SUBSCRIPTIONS_TAG: &str = "Subscriptions";

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(subscribe))
        .routes(routes!(list_subscriptions, remove_subscription))
}

/// The encryption keys of a browser `PushSubscription`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Body of the subscribe endpoint, mirroring the browser subscription shape.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
    #[serde(default)]
    pub channel_id: Option<i32>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Register (or refresh) a browser push subscription.
///
/// The upsert is keyed on the unique endpoint: re-subscribing with the same
/// endpoint refreshes the keys in place, enforced at the storage boundary.
#[utoipa::path(
    post,
    path = "/api/subscription",
    tag = SUBSCRIPTIONS_TAG,
    operation_id = "Subscribe",
    request_body = SubscribeRequest,
    responses(
        (status = 200, description = "Subscription stored", content_type = "application/json"),
        (status = 400, description = "Invalid subscription", content_type = "application/json")
    ),
)]
async fn subscribe(
    axum::Extension(resources): axum::Extension<AppResources>,
    Json(request): Json<SubscribeRequest>,
) -> Result<Json<Value>, ApiError> {
    if !request.endpoint.starts_with("http")
        || request.keys.p256dh.is_empty()
        || request.keys.auth.is_empty()
    {
        return Err(ApiError::BadRequest("Invalid subscription".into()));
    }

    let now = OffsetDateTime::now_utc();
    let model = subscription::ActiveModel {
        id: ActiveValue::NotSet,
        channel_id: ActiveValue::Set(request.channel_id),
        endpoint: ActiveValue::Set(request.endpoint),
        p256dh: ActiveValue::Set(request.keys.p256dh),
        auth: ActiveValue::Set(request.keys.auth),
        user_agent: ActiveValue::Set(request.user_agent),
        is_active: ActiveValue::Set(true),
        last_used_at: ActiveValue::Set(None),
        created_at: ActiveValue::Set(now),
        updated_at: ActiveValue::Set(now),
    };

    subscription::Entity::insert(model)
        .on_conflict(
            OnConflict::column(subscription::Column::Endpoint)
                .update_columns([
                    subscription::Column::P256dh,
                    subscription::Column::Auth,
                    subscription::Column::ChannelId,
                    subscription::Column::UserAgent,
                    subscription::Column::IsActive,
                    subscription::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec(resources.db.as_ref())
        .await?;

    resources.caches.subscriptions.clear();

    Ok(Json(json!({ "success": true })))
}

/// List all registered subscriptions.
#[utoipa::path(
    get,
    path = "/api/subscriptions",
    tag = SUBSCRIPTIONS_TAG,
    operation_id = "List Subscriptions",
    responses(
        (status = 200, description = "All registered subscriptions", body = Vec<subscription::Model>, content_type = "application/json")
    ),
)]
async fn list_subscriptions(
    axum::Extension(resources): axum::Extension<AppResources>,
) -> Result<Json<Vec<subscription::Model>>, ApiError> {
    let subscriptions = subscription::Entity::find()
        .order_by_desc(subscription::Column::CreatedAt)
        .all(resources.db.as_ref())
        .await?;
    Ok(Json(subscriptions))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RemoveSubscriptionRequest {
    pub id: i32,
}

/// Remove a subscription by id.
#[utoipa::path(
    delete,
    path = "/api/subscriptions",
    tag = SUBSCRIPTIONS_TAG,
    operation_id = "Remove Subscription",
    request_body = RemoveSubscriptionRequest,
    responses(
        (status = 200, description = "Subscription removed", content_type = "application/json"),
        (status = 404, description = "No such subscription", content_type = "application/json")
    ),
)]
async fn remove_subscription(
    axum::Extension(resources): axum::Extension<AppResources>,
    headers: HeaderMap,
    Json(request): Json<RemoveSubscriptionRequest>,
) -> Result<Json<Value>, ApiError> {
    let result = subscription::Entity::delete_by_id(request.id)
        .exec(resources.db.as_ref())
        .await?;
    if result.rows_affected == 0 {
        return Err(ApiError::NotFound("Subscription not found".into()));
    }

    resources.caches.subscriptions.clear();

    let ip = client_identifier(&headers);
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    resources
        .security_log
        .record(
            SecurityEvent::new(&ip, user_agent, "DELETE", "/api/subscriptions")
                .with_event("SUBSCRIPTION_REMOVED")
                .with_details(json!({ "id": request.id })),
        )
        .await;

    Ok(Json(json!({ "success": true })))
}

//! Notification history endpoint with pagination and filtering.

use axum::Json;
use axum::extract::Query;
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::AppResources;
use crate::entity::{channel, notification};
use crate::error::ApiError;

/// Tag for OpenAPI documentation.
pub const HISTORY_TAG: &str = "History";

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new().routes(routes!(list_notifications))
}

/// Query parameters for the history listing.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub channel_id: Option<i32>,
    /// "sent" or "failed".
    #[serde(default)]
    pub status: Option<String>,
    /// Contains-substring match over title and body.
    #[serde(default)]
    pub search: Option<String>,
    /// RFC 3339 lower bound on sent_at.
    #[serde(default)]
    pub from: Option<String>,
    /// RFC 3339 upper bound on sent_at.
    #[serde(default)]
    pub to: Option<String>,
    /// "asc" or "desc" (default) over sent_at.
    #[serde(default)]
    pub sort_order: Option<String>,
}

/// One history row enriched with its channel, when the reference resolves.
#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationWithChannel {
    #[serde(flatten)]
    pub notification: notification::Model,
    pub channel: Option<channel::Model>,
}

/// List notification history, newest first by default.
#[utoipa::path(
    get,
    path = "/api/notifications",
    tag = HISTORY_TAG,
    operation_id = "List Notifications",
    params(ListParams),
    responses(
        (status = 200, description = "One page of history with pagination metadata", content_type = "application/json"),
        (status = 400, description = "Malformed filter parameters", content_type = "application/json")
    ),
)]
async fn list_notifications(
    axum::Extension(resources): axum::Extension<AppResources>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let condition = build_condition(&params)?;

    let total = notification::Entity::find()
        .filter(condition.clone())
        .count(resources.db.as_ref())
        .await?;

    let mut query = notification::Entity::find().filter(condition);
    query = match params.sort_order.as_deref() {
        Some("asc") => query.order_by_asc(notification::Column::SentAt),
        _ => query.order_by_desc(notification::Column::SentAt),
    };
    let data = query
        .offset((page - 1) * limit)
        .limit(limit)
        .all(resources.db.as_ref())
        .await?;

    let channels = channel::Entity::find().all(resources.db.as_ref()).await?;
    let enriched: Vec<NotificationWithChannel> = data
        .into_iter()
        .map(|n| {
            let channel = n
                .channel_id
                .and_then(|id| channels.iter().find(|c| c.id == id).cloned());
            NotificationWithChannel {
                notification: n,
                channel,
            }
        })
        .collect();

    let total_pages = total.div_ceil(limit);
    Ok(Json(json!({
        "data": enriched,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": total,
            "totalPages": total_pages,
        },
    })))
}

fn build_condition(params: &ListParams) -> Result<Condition, ApiError> {
    let mut condition = Condition::all();

    if let Some(channel_id) = params.channel_id {
        condition = condition.add(notification::Column::ChannelId.eq(channel_id));
    }
    if let Some(status) = params.status.as_deref() {
        if status != "sent" && status != "failed" {
            return Err(ApiError::BadRequest(
                "Status filter must be 'sent' or 'failed'".into(),
            ));
        }
        condition = condition.add(notification::Column::Status.eq(status));
    }
    if let Some(search) = params.search.as_deref().filter(|s| !s.is_empty()) {
        condition = condition.add(
            Condition::any()
                .add(notification::Column::Title.contains(search))
                .add(notification::Column::Body.contains(search)),
        );
    }
    if let Some(from) = params.from.as_deref() {
        let from = OffsetDateTime::parse(from, &Rfc3339)
            .map_err(|_| ApiError::BadRequest("'from' must be a valid ISO datetime".into()))?;
        condition = condition.add(notification::Column::SentAt.gte(from));
    }
    if let Some(to) = params.to.as_deref() {
        let to = OffsetDateTime::parse(to, &Rfc3339)
            .map_err(|_| ApiError::BadRequest("'to' must be a valid ISO datetime".into()))?;
        condition = condition.add(notification::Column::SentAt.lte(to));
    }

    Ok(condition)
}

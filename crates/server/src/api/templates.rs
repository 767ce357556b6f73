//! Notification template administration endpoints.

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
use crate::dispatch::PushAction;
use crate::entity::notification_template;
use crate::error::ApiError;
use crate::security::client_ip::client_identifier;
use crate::security::log::SecurityEvent;
use crate::templates::{TemplateVariable, slugify};

/// Tag for OpenAPI documentation.
pub const TEMPLATES_TAG: &str = "Templates";

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new().routes(routes!(list_templates, create_template, delete_template))
}

fn generate_api_key() -> String {
    format!("tpl_{}", Uuid::new_v4().simple())
}

/// List all templates, served through the templates cache namespace.
#[utoipa::path(
    get,
    path = "/api/templates",
    tag = TEMPLATES_TAG,
    operation_id = "List Templates",
    responses(
        (status = 200, description = "All templates", body = Vec<notification_template::Model>, content_type = "application/json")
    ),
)]
async fn list_templates(
    axum::Extension(resources): axum::Extension<AppResources>,
) -> Result<Json<Vec<notification_template::Model>>, ApiError> {
    let db = resources.db.clone();
    let templates = resources
        .caches
        .templates
        .get_or_try_insert_with("all".to_string(), || async move {
            notification_template::Entity::find()
                .order_by_asc(notification_template::Column::Id)
                .all(db.as_ref())
                .await
        })
        .await?;
    Ok(Json(templates))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateRequest {
    pub name: String,
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
    pub variables: Option<Vec<TemplateVariable>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Create a template. The slug is derived from the name; actions and the
/// variable schema are stored as JSON.
#[utoipa::path(
    post,
    path = "/api/templates",
    tag = TEMPLATES_TAG,
    operation_id = "Create Template",
    request_body = CreateTemplateRequest,
    responses(
        (status = 200, description = "Template created", content_type = "application/json"),
        (status = 400, description = "Missing name, title or body", content_type = "application/json"),
        (status = 409, description = "A template with this name already exists", content_type = "application/json")
    ),
)]
async fn create_template(
    axum::Extension(resources): axum::Extension<AppResources>,
    headers: HeaderMap,
    Json(request): Json<CreateTemplateRequest>,
) -> Result<Json<Value>, ApiError> {
    let name = request.name.trim();
    let title = request.title.trim();
    let body = request.body.trim();
    if name.is_empty() || title.is_empty() || body.is_empty() {
        return Err(ApiError::BadRequest(
            "Name, title, and body are required".into(),
        ));
    }
    if name.chars().count() > 64 {
        return Err(ApiError::BadRequest(
            "Template name must be less than 64 characters".into(),
        ));
    }
    if title.chars().count() > 256 {
        return Err(ApiError::BadRequest(
            "Title must be less than 256 characters".into(),
        ));
    }
    if body.chars().count() > 1024 {
        return Err(ApiError::BadRequest(
            "Body must be less than 1024 characters".into(),
        ));
    }

    let slug = slugify(name);
    let existing = notification_template::Entity::find()
        .filter(notification_template::Column::Slug.eq(slug.clone()))
        .one(resources.db.as_ref())
        .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict(
            "A template with this name already exists".into(),
        ));
    }

    let actions = request
        .actions
        .as_ref()
        .map(|a| serde_json::to_string(a))
        .transpose()
        .map_err(|e| ApiError::BadRequest(format!("Invalid actions: {e}")))?;
    let variables = request
        .variables
        .as_ref()
        .map(|v| serde_json::to_string(v))
        .transpose()
        .map_err(|e| ApiError::BadRequest(format!("Invalid variables: {e}")))?;

    let now = OffsetDateTime::now_utc();
    let model = notification_template::ActiveModel {
        id: ActiveValue::NotSet,
        channel_id: ActiveValue::Set(request.channel_id),
        name: ActiveValue::Set(name.to_string()),
        slug: ActiveValue::Set(slug.clone()),
        title: ActiveValue::Set(title.to_string()),
        body: ActiveValue::Set(body.to_string()),
        icon: ActiveValue::Set(request.icon),
        image: ActiveValue::Set(request.image),
        badge: ActiveValue::Set(request.badge),
        url: ActiveValue::Set(request.url),
        actions: ActiveValue::Set(actions),
        variables: ActiveValue::Set(variables),
        api_key: ActiveValue::Set(generate_api_key()),
        is_active: ActiveValue::Set(request.is_active.unwrap_or(true)),
        created_at: ActiveValue::Set(now),
        updated_at: ActiveValue::Set(now),
    };
    model.insert(resources.db.as_ref()).await?;

    resources.caches.templates.clear();

    resources
        .security_log
        .record(
            event_from(&headers, "POST", "/api/templates")
                .with_event("TEMPLATE_CREATED")
                .with_details(json!({ "name": name, "channelId": request.channel_id })),
        )
        .await;

    Ok(Json(json!({ "success": true, "slug": slug })))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteTemplateRequest {
    pub id: i32,
}

/// Delete a template by id.
#[utoipa::path(
    delete,
    path = "/api/templates",
    tag = TEMPLATES_TAG,
    operation_id = "Delete Template",
    request_body = DeleteTemplateRequest,
    responses(
        (status = 200, description = "Template deleted", content_type = "application/json"),
        (status = 404, description = "No such template", content_type = "application/json")
    ),
)]
async fn delete_template(
    axum::Extension(resources): axum::Extension<AppResources>,
    headers: HeaderMap,
    Json(request): Json<DeleteTemplateRequest>,
) -> Result<Json<Value>, ApiError> {
    let result = notification_template::Entity::delete_by_id(request.id)
        .exec(resources.db.as_ref())
        .await?;
    if result.rows_affected == 0 {
        return Err(ApiError::NotFound("Template not found".into()));
    }

    resources.caches.templates.clear();

    resources
        .security_log
        .record(
            event_from(&headers, "DELETE", "/api/templates")
                .with_event("TEMPLATE_DELETED")
                .with_details(json!({ "id": request.id })),
        )
        .await;

    Ok(Json(json!({ "success": true })))
}

fn event_from(headers: &HeaderMap, method: &str, path: &str) -> SecurityEvent {
    let ip = client_identifier(headers);
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    SecurityEvent::new(&ip, user_agent, method, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_keys_carry_prefix() {
        let key = generate_api_key();
        assert!(key.starts_with("tpl_"));
        assert_eq!(key.len(), "tpl_".len() + 32);
    }
}

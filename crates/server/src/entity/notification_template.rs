use sea_orm::entity::prelude::*;
use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;

/// A reusable message shape with `{{variable}}` placeholders.
///
/// `actions` and `variables` are JSON-serialized lists; see
/// [`crate::templates::TemplateVariable`] for the variable schema shape.
/// The per-template API key is reserved for a future dispatch path.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, ToSchema)]
#[sea_orm(table_name = "notification_templates")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub channel_id: Option<i32>,
    pub name: String,
    #[sea_orm(unique)]
    pub slug: String,
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub image: Option<String>,
    pub badge: Option<String>,
    pub url: Option<String>,
    pub actions: Option<String>,
    pub variables: Option<String>,
    #[sea_orm(unique)]
    pub api_key: String,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

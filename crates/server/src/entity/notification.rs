use sea_orm::entity::prelude::*;
use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Immutable fan-out history record: exactly one row per dispatch invocation.
///
/// `status` is "sent" when at least one recipient accepted the push,
/// "failed" otherwise. `actions` holds the JSON-serialized action list.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, ToSchema)]
#[sea_orm(table_name = "notifications")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub channel_id: Option<i32>,
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub image: Option<String>,
    pub badge: Option<String>,
    pub url: Option<String>,
    pub actions: Option<String>,
    pub require_interaction: Option<bool>,
    pub status: String,
    pub sent_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

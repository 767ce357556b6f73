use sea_orm::entity::prelude::*;
use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;

/// A deferred or recurring fan-out job.
///
/// Lifecycle: `pending` until the sweep fires it; `repeat = none` rows become
/// `sent` (terminal), repeating rows advance `scheduled_at` and stay
/// `pending`. Explicit cancellation sets `cancelled` (terminal). The timezone
/// is display-only; `scheduled_at` is UTC.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, ToSchema)]
#[sea_orm(table_name = "scheduled_notifications")]
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
    pub scheduled_at: OffsetDateTime,
    pub timezone: String,
    pub repeat: String,
    pub status: String,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

//! Read-side aggregation over the notification log: counts by status, by
//! channel, daily buckets for the last week and the most recent entries.

use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseBackend, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Statement,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppResources;
use crate::entity::{channel, notification};

const STATS_CACHE_KEY: &str = "overview";

/// Per-channel notification count, null channel reported as "Global".
#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStat {
    pub name: String,
    pub color: String,
    pub count: i64,
}

/// Notification count for one calendar day.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct DailyStat {
    pub date: String,
    pub count: i64,
}

/// The aggregate served by `GET /api/stats`.
#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsOverview {
    pub total: i64,
    pub sent: i64,
    pub failed: i64,
    /// Percentage of sent notifications, 100 when the log is empty.
    pub success_rate: i64,
    pub channel_stats: Vec<ChannelStat>,
    pub daily_stats: Vec<DailyStat>,
    pub recent: Vec<notification::Model>,
}

/// Compute the stats overview, served through the 30-second cache namespace.
pub async fn overview(resources: &AppResources) -> Result<StatsOverview, sea_orm::DbErr> {
    let resources = resources.clone();
    resources
        .caches
        .stats
        .clone()
        .get_or_try_insert_with(STATS_CACHE_KEY.to_string(), || async move {
            compute_overview(&resources).await
        })
        .await
}

async fn compute_overview(resources: &AppResources) -> Result<StatsOverview, sea_orm::DbErr> {
    let db = resources.db.as_ref();

    let total = notification::Entity::find().count(db).await? as i64;
    let sent = notification::Entity::find()
        .filter(notification::Column::Status.eq("sent"))
        .count(db)
        .await? as i64;
    let failed = notification::Entity::find()
        .filter(notification::Column::Status.eq("failed"))
        .count(db)
        .await? as i64;

    let success_rate = if total > 0 {
        ((sent as f64 / total as f64) * 100.0).round() as i64
    } else {
        100
    };

    let per_channel: Vec<(Option<i32>, i64)> = notification::Entity::find()
        .select_only()
        .column(notification::Column::ChannelId)
        .column_as(notification::Column::Id.count(), "count")
        .group_by(notification::Column::ChannelId)
        .into_tuple()
        .all(db)
        .await?;

    let channels = channel::Entity::find().all(db).await?;
    let channel_stats = per_channel
        .into_iter()
        .map(|(channel_id, count)| {
            let channel = channel_id.and_then(|id| channels.iter().find(|c| c.id == id));
            ChannelStat {
                name: channel
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| "Global".to_string()),
                color: channel
                    .map(|c| c.color.clone())
                    .unwrap_or_else(|| "#6B7280".to_string()),
                count,
            }
        })
        .collect();

    let daily_stats = daily_buckets(resources).await?;

    let recent = notification::Entity::find()
        .order_by_desc(notification::Column::SentAt)
        .limit(5)
        .all(db)
        .await?;

    Ok(StatsOverview {
        total,
        sent,
        failed,
        success_rate,
        channel_stats,
        daily_stats,
        recent,
    })
}

/// Daily notification counts for the last 7 days. Date bucketing needs
/// backend-specific SQL.
async fn daily_buckets(resources: &AppResources) -> Result<Vec<DailyStat>, sea_orm::DbErr> {
    let db = resources.db.as_ref();
    let backend = db.get_database_backend();
    let sql = match backend {
        DatabaseBackend::Postgres => {
            "SELECT TO_CHAR(DATE(sent_at), 'YYYY-MM-DD') AS day, COUNT(*) AS count \
             FROM notifications WHERE sent_at >= NOW() - INTERVAL '7 days' \
             GROUP BY DATE(sent_at) ORDER BY DATE(sent_at)"
        }
        DatabaseBackend::Sqlite => {
            "SELECT DATE(sent_at) AS day, COUNT(*) AS count \
             FROM notifications WHERE sent_at >= datetime('now', '-7 days') \
             GROUP BY DATE(sent_at) ORDER BY DATE(sent_at)"
        }
        DatabaseBackend::MySql => {
            "SELECT DATE_FORMAT(DATE(sent_at), '%Y-%m-%d') AS day, COUNT(*) AS count \
             FROM notifications WHERE sent_at >= (NOW() - INTERVAL 7 DAY) \
             GROUP BY DATE(sent_at) ORDER BY DATE(sent_at)"
        }
    };
    let rows = db
        .query_all(Statement::from_string(backend, sql))
        .await?;

    let mut buckets = Vec::with_capacity(rows.len());
    for row in rows {
        let date: String = row.try_get("", "day")?;
        let count: i64 = row.try_get("", "count")?;
        buckets.push(DailyStat { date, count });
    }
    Ok(buckets)
}

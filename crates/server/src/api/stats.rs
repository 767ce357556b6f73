//! Delivery statistics endpoint.

use axum::Json;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::AppResources;
use crate::api::notifications::HISTORY_TAG;
use crate::error::ApiError;
use crate::stats::StatsOverview;

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new().routes(routes!(get_stats))
}

/// Aggregate delivery statistics, cached for 30 seconds.
#[utoipa::path(
    get,
    path = "/api/stats",
    tag = HISTORY_TAG,
    operation_id = "Get Statistics",
    responses(
        (status = 200, description = "Totals, per-channel and daily counts, recent entries", body = StatsOverview, content_type = "application/json")
    ),
)]
async fn get_stats(
    axum::Extension(resources): axum::Extension<AppResources>,
) -> Result<Json<StatsOverview>, ApiError> {
    let overview = crate::stats::overview(&resources).await?;
    Ok(Json(overview))
}

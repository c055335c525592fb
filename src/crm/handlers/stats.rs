use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use std::sync::Arc;

use crate::core::middleware::CallerContext;
use crate::core::shared::state::AppState;
use crate::crm::error::CrmError;
use crate::crm::types::{DailyCallStats, StatsRangeQuery, StatsRangeResponse};

use super::{aggregator, blocking};

pub async fn handle_daily_stats(
    State(state): State<Arc<AppState>>,
    _caller: CallerContext,
    path: Result<Path<(i64, String)>, PathRejection>,
) -> Result<Json<DailyCallStats>, CrmError> {
    let Path((telecaller_id, date)) = path?;
    let aggregator = aggregator(&state);
    let stats = blocking(move || aggregator.get_daily_stats(telecaller_id, &date)).await?;
    Ok(Json(stats))
}

pub async fn handle_stats_range(
    State(state): State<Arc<AppState>>,
    _caller: CallerContext,
    telecaller_id: Result<Path<i64>, PathRejection>,
    query: Result<Query<StatsRangeQuery>, QueryRejection>,
) -> Result<Json<StatsRangeResponse>, CrmError> {
    let Path(telecaller_id) = telecaller_id?;
    let Query(range) = query?;
    let aggregator = aggregator(&state);
    let stats =
        blocking(move || aggregator.get_stats(telecaller_id, &range.from, &range.to)).await?;
    Ok(Json(stats))
}

pub async fn handle_team_stats(
    State(state): State<Arc<AppState>>,
    _caller: CallerContext,
    date: Result<Path<String>, PathRejection>,
) -> Result<Json<Vec<DailyCallStats>>, CrmError> {
    let Path(date) = date?;
    let aggregator = aggregator(&state);
    let rows = blocking(move || aggregator.team_stats(&date)).await?;
    Ok(Json(rows))
}

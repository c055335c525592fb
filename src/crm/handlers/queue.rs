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
use crate::crm::types::{QueueCursorQuery, QueuePosition, QueueQuery, QueueResponse};

use super::{blocking, work_queue};

pub async fn handle_queue(
    State(state): State<Arc<AppState>>,
    _caller: CallerContext,
    telecaller_id: Result<Path<i64>, PathRejection>,
    query: Result<Query<QueueQuery>, QueryRejection>,
) -> Result<Json<QueueResponse>, CrmError> {
    let Path(telecaller_id) = telecaller_id?;
    let Query(query) = query?;
    let queue = work_queue(&state);
    let ordered = blocking(move || queue.ordered_queue(telecaller_id, query.status)).await?;
    Ok(Json(ordered))
}

pub async fn handle_queue_current(
    State(state): State<Arc<AppState>>,
    _caller: CallerContext,
    telecaller_id: Result<Path<i64>, PathRejection>,
    query: Result<Query<QueueCursorQuery>, QueryRejection>,
) -> Result<Json<QueuePosition>, CrmError> {
    let Path(telecaller_id) = telecaller_id?;
    let Query(cursor) = query?;
    let index = cursor.index.unwrap_or(0);
    let queue = work_queue(&state);
    let position =
        blocking(move || queue.current_lead(telecaller_id, index, cursor.status)).await?;
    Ok(Json(position))
}

pub async fn handle_queue_next(
    State(state): State<Arc<AppState>>,
    _caller: CallerContext,
    telecaller_id: Result<Path<i64>, PathRejection>,
    query: Result<Query<QueueCursorQuery>, QueryRejection>,
) -> Result<Json<QueuePosition>, CrmError> {
    let Path(telecaller_id) = telecaller_id?;
    let Query(cursor) = query?;
    let current_index = cursor.current_index.or(cursor.index).unwrap_or(0);
    let queue = work_queue(&state);
    let position =
        blocking(move || queue.advance_to_next(telecaller_id, current_index, cursor.status))
            .await?;
    Ok(Json(position))
}

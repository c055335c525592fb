use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::core::middleware::CallerContext;
use crate::core::shared::state::AppState;
use crate::crm::error::CrmError;
use crate::crm::types::{
    CallLogEntry, CallLogQuery, CorrectCallLogRequest, ReconcileReport, ReconcileRequest,
    RecordCallRequest, RecordedCall,
};

use super::{blocking, processor};

pub async fn handle_record_call(
    State(state): State<Arc<AppState>>,
    caller: CallerContext,
    payload: Result<Json<RecordCallRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RecordedCall>), CrmError> {
    let Json(req) = payload?;
    caller.ensure_acting_as(req.caller_id)?;
    let processor = processor(&state);
    let recorded = blocking(move || processor.record_call(req, caller.role)).await?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

pub async fn handle_list_calls(
    State(state): State<Arc<AppState>>,
    _caller: CallerContext,
    query: Result<Query<CallLogQuery>, QueryRejection>,
) -> Result<Json<Vec<CallLogEntry>>, CrmError> {
    let Query(query) = query?;
    let processor = processor(&state);
    let calls =
        blocking(move || processor.list_by_caller(query.caller_id, query.date.as_deref())).await?;
    Ok(Json(calls))
}

pub async fn handle_correct_call(
    State(state): State<Arc<AppState>>,
    _caller: CallerContext,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<CorrectCallLogRequest>, JsonRejection>,
) -> Result<Json<CallLogEntry>, CrmError> {
    let Path(id) = id?;
    let Json(req) = payload?;
    let processor = processor(&state);
    let entry = blocking(move || processor.correct_call_log(id, req)).await?;
    Ok(Json(entry))
}

pub async fn handle_reconcile_call(
    State(state): State<Arc<AppState>>,
    _caller: CallerContext,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<RecordedCall>, CrmError> {
    let Path(id) = id?;
    let processor = processor(&state);
    let recorded = blocking(move || processor.reconcile_call(id)).await?;
    Ok(Json(recorded))
}

pub async fn handle_reconcile_pending(
    State(state): State<Arc<AppState>>,
    _caller: CallerContext,
    payload: Option<Json<ReconcileRequest>>,
) -> Result<Json<ReconcileReport>, CrmError> {
    let limit = payload.and_then(|Json(req)| req.limit);
    let processor = processor(&state);
    let report = blocking(move || processor.reconcile_pending(limit)).await?;
    Ok(Json(report))
}

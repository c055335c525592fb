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
    CallLogEntry, CreateLeadRequest, ImportLeadsRequest, ImportResult, Lead, LeadListQuery,
    LeadListResponse, SetStageRequest, UpdateLeadRequest,
};

use super::{blocking, processor, registry};

pub async fn handle_create_lead(
    State(state): State<Arc<AppState>>,
    _caller: CallerContext,
    payload: Result<Json<CreateLeadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Lead>), CrmError> {
    let Json(req) = payload?;
    let registry = registry(&state);
    let lead = blocking(move || registry.create_lead(req)).await?;
    Ok((StatusCode::CREATED, Json(lead)))
}

pub async fn handle_import_leads(
    State(state): State<Arc<AppState>>,
    caller: CallerContext,
    payload: Result<Json<ImportLeadsRequest>, JsonRejection>,
) -> Result<Json<ImportResult>, CrmError> {
    let Json(req) = payload?;
    log::info!("User {} importing {} lead rows", caller.user_id, req.rows.len());
    let registry = registry(&state);
    let result = blocking(move || registry.import_leads(req.rows)).await?;
    Ok(Json(result))
}

pub async fn handle_list_leads(
    State(state): State<Arc<AppState>>,
    _caller: CallerContext,
    query: Result<Query<LeadListQuery>, QueryRejection>,
) -> Result<Json<LeadListResponse>, CrmError> {
    let Query(query) = query?;
    let registry = registry(&state);
    let page = blocking(move || registry.list_leads(&query)).await?;
    Ok(Json(page))
}

pub async fn handle_get_lead(
    State(state): State<Arc<AppState>>,
    _caller: CallerContext,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Lead>, CrmError> {
    let Path(id) = id?;
    let registry = registry(&state);
    let lead = blocking(move || registry.get_lead(id)).await?;
    Ok(Json(lead))
}

pub async fn handle_update_lead(
    State(state): State<Arc<AppState>>,
    caller: CallerContext,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateLeadRequest>, JsonRejection>,
) -> Result<Json<Lead>, CrmError> {
    let Path(id) = id?;
    let Json(patch) = payload?;
    let registry = registry(&state);
    let lead = blocking(move || registry.update_lead(id, patch, caller.role)).await?;
    Ok(Json(lead))
}

pub async fn handle_set_stage(
    State(state): State<Arc<AppState>>,
    caller: CallerContext,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<SetStageRequest>, JsonRejection>,
) -> Result<Json<Lead>, CrmError> {
    let Path(id) = id?;
    let Json(req) = payload?;
    let registry = registry(&state);
    let lead = blocking(move || registry.set_stage(id, req, caller.role)).await?;
    Ok(Json(lead))
}

pub async fn handle_delete_lead(
    State(state): State<Arc<AppState>>,
    caller: CallerContext,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, CrmError> {
    let Path(id) = id?;
    let registry = registry(&state);
    blocking(move || registry.delete_lead(id, caller.role)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_list_lead_calls(
    State(state): State<Arc<AppState>>,
    _caller: CallerContext,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Vec<CallLogEntry>>, CrmError> {
    let Path(id) = id?;
    let processor = processor(&state);
    let calls = blocking(move || processor.list_call_logs(id)).await?;
    Ok(Json(calls))
}

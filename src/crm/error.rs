use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::{response::IntoResponse, Json};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

use super::types::LeadSummary;

#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Lead {0} not found")]
    LeadNotFound(i64),
    #[error("Caller {0} not found")]
    CallerNotFound(i64),
    #[error("Phone number already belongs to lead {}", .existing.id)]
    DuplicatePhone { existing: LeadSummary },
    #[error("Fields not writable at this capability tier: {}", .fields.join(", "))]
    FieldRestricted { fields: Vec<String> },
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("No leads in the work queue of telecaller {telecaller_id}")]
    EmptyQueue { telecaller_id: i64 },
    #[error("Telecaller {telecaller_id} reached the daily limit of {limit} calls")]
    CallLimitReached { telecaller_id: i64, limit: i32 },
    #[error("Call {call_log_id} was logged but stage/stats bookkeeping is pending: {reason}")]
    EffectsPending { call_log_id: i64, reason: String },
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CrmError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) | Self::LeadNotFound(_) | Self::CallerNotFound(_) => "not_found",
            Self::DuplicatePhone { .. } => "duplicate_phone",
            Self::FieldRestricted { .. } => "field_restricted",
            Self::Forbidden(_) => "forbidden",
            Self::Unauthorized(_) => "unauthorized",
            Self::EmptyQueue { .. } => "empty_queue",
            Self::CallLimitReached { .. } => "call_limit_reached",
            Self::EffectsPending { .. } => "effects_pending",
            Self::Database(_) => "database_error",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_)
            | Self::LeadNotFound(_)
            | Self::CallerNotFound(_)
            | Self::EmptyQueue { .. } => StatusCode::NOT_FOUND,
            Self::DuplicatePhone { .. } => StatusCode::CONFLICT,
            Self::FieldRestricted { .. } | Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::CallLimitReached { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::EffectsPending { .. } => StatusCode::ACCEPTED,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DieselError> for CrmError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::NotFound => Self::NotFound("Record not found".to_string()),
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for CrmError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        Self::Database(format!("Connection pool error: {e}"))
    }
}

impl From<JsonRejection> for CrmError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for CrmError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for CrmError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

pub fn is_unique_violation(e: &DieselError) -> bool {
    matches!(
        e,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

impl IntoResponse for CrmError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let mut body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        match &self {
            Self::DuplicatePhone { existing } => {
                body["existingLead"] = serde_json::to_value(existing).unwrap_or_default();
            }
            Self::FieldRestricted { fields } => {
                body["fields"] = serde_json::json!(fields);
            }
            Self::EffectsPending { call_log_id, .. } => {
                body["callLogId"] = serde_json::json!(call_log_id);
                body["callLogged"] = serde_json::json!(true);
            }
            _ => {}
        }
        (status, Json(body)).into_response()
    }
}

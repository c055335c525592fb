//! Lead engagement: lead intake and stage tracking, call recording, daily
//! call statistics and the per-telecaller work queue.

pub mod calls;
pub mod error;
pub mod handlers;
pub mod import;
pub mod queue;
pub mod registry;
pub mod stage;
pub mod stats;
pub mod storage;
pub mod types;
pub mod validation;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::core::shared::state::AppState;

pub use calls::CallEventProcessor;
pub use error::CrmError;
pub use queue::WorkQueue;
pub use registry::LeadRegistry;
pub use stats::StatsAggregator;

use handlers::{
    handle_correct_call, handle_create_lead, handle_daily_stats, handle_delete_lead,
    handle_get_lead, handle_import_leads, handle_list_calls, handle_list_lead_calls,
    handle_list_leads, handle_queue, handle_queue_current, handle_queue_next,
    handle_reconcile_call, handle_reconcile_pending, handle_record_call, handle_set_stage,
    handle_stats_range, handle_team_stats, handle_update_lead,
};

pub fn configure_crm_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/leads", get(handle_list_leads).post(handle_create_lead))
        .route("/api/leads/import", post(handle_import_leads))
        .route(
            "/api/leads/:id",
            get(handle_get_lead)
                .put(handle_update_lead)
                .delete(handle_delete_lead),
        )
        .route("/api/leads/:id/stage", put(handle_set_stage))
        .route("/api/leads/:id/calls", get(handle_list_lead_calls))
        .route("/api/calls", get(handle_list_calls).post(handle_record_call))
        .route("/api/calls/reconcile", post(handle_reconcile_pending))
        .route("/api/calls/:id", put(handle_correct_call))
        .route("/api/calls/:id/reconcile", post(handle_reconcile_call))
        .route("/api/stats/team/:date", get(handle_team_stats))
        .route("/api/stats/:telecaller_id", get(handle_stats_range))
        .route(
            "/api/stats/:telecaller_id/daily/:date",
            get(handle_daily_stats),
        )
        .route("/api/queue/:telecaller_id", get(handle_queue))
        .route("/api/queue/:telecaller_id/current", get(handle_queue_current))
        .route("/api/queue/:telecaller_id/next", get(handle_queue_next))
}

pub mod calls;
pub mod leads;
pub mod queue;
pub mod stats;

pub use calls::*;
pub use leads::*;
pub use queue::*;
pub use stats::*;

use crate::core::shared::state::AppState;
use crate::crm::calls::CallEventProcessor;
use crate::crm::error::CrmError;
use crate::crm::queue::WorkQueue;
use crate::crm::registry::LeadRegistry;
use crate::crm::stats::StatsAggregator;

/// Runs synchronous storage work off the async executor.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, CrmError>
where
    F: FnOnce() -> Result<T, CrmError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CrmError::Internal(format!("Task join error: {e}")))?
}

pub(crate) fn registry(state: &AppState) -> LeadRegistry {
    LeadRegistry::new(state.conn.clone(), state.config.engagement.clone())
}

pub(crate) fn processor(state: &AppState) -> CallEventProcessor {
    CallEventProcessor::new(state.conn.clone(), state.config.engagement.clone())
}

pub(crate) fn aggregator(state: &AppState) -> StatsAggregator {
    StatsAggregator::new(state.conn.clone())
}

pub(crate) fn work_queue(state: &AppState) -> WorkQueue {
    WorkQueue::new(state.conn.clone())
}

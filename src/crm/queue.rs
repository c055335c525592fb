use diesel::prelude::*;
use log::debug;

use crate::core::shared::schema::leads;
use crate::core::shared::utils::DbPool;

use super::error::CrmError;
use super::storage::{db_leads_to_leads, DbLead};
use super::types::{Lead, LeadStage, LeadStatus, QueuePosition, QueueResponse};

fn priority_bucket(stage: LeadStage) -> u8 {
    if stage == LeadStage::New {
        0
    } else if stage.is_active_engagement() {
        1
    } else {
        2
    }
}

/// Calling order: `new` leads, then leads under active engagement, then the
/// rest; oldest first within a bucket, lead id as the final tie-break.
pub fn order_queue(mut leads: Vec<Lead>) -> Vec<Lead> {
    leads.sort_by_key(|lead| (priority_bucket(lead.lead_stage), lead.created_at, lead.id));
    leads
}

/// Maps a caller-held cursor onto a queue of `len` leads.
pub fn wrap_index(index: i64, len: usize) -> Result<usize, CrmError> {
    if len == 0 {
        return Err(CrmError::Internal("Cannot index an empty queue".to_string()));
    }
    let index = usize::try_from(index)
        .map_err(|_| CrmError::Validation(format!("Queue index must be non-negative, got {index}")))?;
    Ok(index % len)
}

pub fn next_index(current: i64, len: usize) -> Result<usize, CrmError> {
    let current = wrap_index(current, len)?;
    Ok((current + 1) % len)
}

/// A telecaller's calling order, recomputed from the lead table on every read.
#[derive(Clone)]
pub struct WorkQueue {
    pool: DbPool,
}

impl WorkQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn ordered_queue(
        &self,
        telecaller_id: i64,
        status: Option<LeadStatus>,
    ) -> Result<QueueResponse, CrmError> {
        let status = status.unwrap_or_default();
        let mut conn = self.pool.get()?;
        let rows: Vec<DbLead> = leads::table
            .filter(leads::assigned_telecaller_id.eq(telecaller_id))
            .filter(leads::lead_status.eq(status.as_str()))
            .select(DbLead::as_select())
            .load(&mut conn)?;
        let ordered = order_queue(db_leads_to_leads(rows)?);
        debug!(
            "Queue for telecaller {telecaller_id} ({status}): {} leads",
            ordered.len()
        );
        Ok(QueueResponse {
            telecaller_id,
            status,
            total: ordered.len(),
            leads: ordered,
        })
    }

    pub fn current_lead(
        &self,
        telecaller_id: i64,
        index: i64,
        status: Option<LeadStatus>,
    ) -> Result<QueuePosition, CrmError> {
        let queue = self.non_empty(telecaller_id, status)?;
        let index = wrap_index(index, queue.len())?;
        position(queue, index)
    }

    pub fn advance_to_next(
        &self,
        telecaller_id: i64,
        current_index: i64,
        status: Option<LeadStatus>,
    ) -> Result<QueuePosition, CrmError> {
        let queue = self.non_empty(telecaller_id, status)?;
        let index = next_index(current_index, queue.len())?;
        position(queue, index)
    }

    fn non_empty(
        &self,
        telecaller_id: i64,
        status: Option<LeadStatus>,
    ) -> Result<Vec<Lead>, CrmError> {
        let queue = self.ordered_queue(telecaller_id, status)?.leads;
        if queue.is_empty() {
            return Err(CrmError::EmptyQueue { telecaller_id });
        }
        Ok(queue)
    }
}

fn position(mut queue: Vec<Lead>, index: usize) -> Result<QueuePosition, CrmError> {
    let total = queue.len();
    if index >= total {
        return Err(CrmError::Internal(format!("Queue index {index} out of {total}")));
    }
    Ok(QueuePosition {
        index,
        total,
        lead: queue.swap_remove(index),
    })
}

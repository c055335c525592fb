//! Lead stage transitions.
//!
//! Every stage mutation, whether it comes from a call event, the narrow stage
//! operation or a field patch, is planned here and written by
//! [`crate::crm::registry::write_stage`].

use chrono::{DateTime, Utc};

use super::error::CrmError;
use super::types::{CallOutcome, LeadStage};

/// The stage-related columns of a lead as currently stored.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSnapshot {
    pub stage: LeadStage,
    pub conversion_date: Option<DateTime<Utc>>,
    pub lost_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageRequest {
    /// An operator asked for a stage directly.
    Explicit {
        stage: LeadStage,
        lost_reason: Option<String>,
        conversion_date: Option<DateTime<Utc>>,
    },
    /// A recorded call, optionally carrying the stage the caller picked.
    CallOutcome {
        outcome: CallOutcome,
        explicit: Option<LeadStage>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagePlan {
    pub stage: LeadStage,
    pub conversion_date: Option<DateTime<Utc>>,
    pub lost_reason: Option<String>,
    pub changed: bool,
}

impl StagePlan {
    fn unchanged(current: &StageSnapshot) -> Self {
        Self {
            stage: current.stage,
            conversion_date: current.conversion_date,
            lost_reason: current.lost_reason.clone(),
            changed: false,
        }
    }

    fn with_change_flag(mut self, current: &StageSnapshot) -> Self {
        self.changed = self.stage != current.stage
            || self.conversion_date != current.conversion_date
            || self.lost_reason != current.lost_reason;
        self
    }
}

pub fn plan_transition(
    current: &StageSnapshot,
    request: StageRequest,
    now: DateTime<Utc>,
) -> Result<StagePlan, CrmError> {
    match request {
        StageRequest::CallOutcome { outcome, .. } if outcome.is_conversion() => {
            // A converted outcome wins over whatever stage was requested.
            Ok(StagePlan {
                stage: LeadStage::Converted,
                conversion_date: current.conversion_date.or(Some(now)),
                lost_reason: None,
                changed: false,
            }
            .with_change_flag(current))
        }
        StageRequest::CallOutcome { explicit, .. } => match explicit {
            Some(stage) if stage != current.stage => plan_explicit(current, stage, None, None, now),
            _ => Ok(StagePlan::unchanged(current)),
        },
        StageRequest::Explicit {
            stage,
            lost_reason,
            conversion_date,
        } => plan_explicit(current, stage, lost_reason, conversion_date, now),
    }
}

fn plan_explicit(
    current: &StageSnapshot,
    stage: LeadStage,
    lost_reason: Option<String>,
    conversion_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<StagePlan, CrmError> {
    if current.stage.is_terminal() && stage != current.stage {
        return Err(CrmError::Validation(format!(
            "Lead is {} and cannot move to {stage}",
            current.stage
        )));
    }
    if lost_reason.is_some() && stage != LeadStage::Lost {
        return Err(CrmError::Validation(
            "lostReason can only be set when the stage is lost".to_string(),
        ));
    }
    if conversion_date.is_some() && stage != LeadStage::Converted {
        return Err(CrmError::Validation(
            "conversionDate can only be set when the stage is converted".to_string(),
        ));
    }

    let plan = match stage {
        LeadStage::Converted => StagePlan {
            stage,
            conversion_date: conversion_date.or(current.conversion_date).or(Some(now)),
            lost_reason: current.lost_reason.clone(),
            changed: false,
        },
        LeadStage::Lost => StagePlan {
            stage,
            conversion_date: current.conversion_date,
            lost_reason: lost_reason.or_else(|| current.lost_reason.clone()),
            changed: false,
        },
        _ => StagePlan {
            stage,
            conversion_date: current.conversion_date,
            lost_reason: current.lost_reason.clone(),
            changed: false,
        },
    };
    Ok(plan.with_change_flag(current))
}

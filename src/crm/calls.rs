//! Call recording.
//!
//! A call is persisted in two steps. The first transaction validates the event
//! and inserts the call-log row with `effects_applied_at` unset. The second
//! locks that row and, if it has not been applied yet, moves the lead's stage,
//! adds the event to the daily stats row and stamps `effects_applied_at`.
//! The second step can be re-run for the same call-log id any number of times
//! and counts the event exactly once.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::{error, info, warn};

use crate::core::config::EngagementConfig;
use crate::core::shared::schema::{call_logs, users};
use crate::core::shared::utils::DbPool;

use super::error::CrmError;
use super::registry::{ensure_fields_writable, find_lead, lock_lead, snapshot, write_stage};
use super::stage::{plan_transition, StageRequest};
use super::stats::{find_daily_stats, upsert_daily_stats, StatsDelta};
use super::storage::{
    db_call_log_to_entry, db_call_logs_to_entries, db_lead_to_lead, DbCallLog, NewDbCallLog,
};
use super::types::{
    CallLogEntry, CallOutcome, CorrectCallLogRequest, LeadStage, ReconcileFailure,
    ReconcileReport, RecordCallRequest, RecordedCall, UserRole,
};
use super::validation::{non_blank, parse_date, parse_timestamp, stat_date_for, validate_duration};

#[derive(Clone)]
pub struct CallEventProcessor {
    pool: DbPool,
    config: EngagementConfig,
}

impl CallEventProcessor {
    pub fn new(pool: DbPool, config: EngagementConfig) -> Self {
        Self { pool, config }
    }

    pub fn record_call(
        &self,
        req: RecordCallRequest,
        role: UserRole,
    ) -> Result<RecordedCall, CrmError> {
        let offset = self.config.reference_offset();
        let call_date = parse_timestamp("callDate", &req.call_date, offset)?;
        let next_followup_date = req
            .next_followup_date
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .map(|value| parse_timestamp("nextFollowupDate", value, offset))
            .transpose()?;
        let duration_seconds = validate_duration(req.duration_seconds)?;
        if req.new_lead_stage.is_some() {
            ensure_fields_writable(&["leadStage"], role)?;
        }
        let stat_date = stat_date_for(call_date, offset);
        let now = Utc::now();

        let mut conn = self.pool.get()?;
        let logged: DbCallLog = conn.transaction::<_, CrmError, _>(|conn| {
            let lead = lock_lead(conn, req.lead_id)?;
            // Locking the caller row serialises calls by the same telecaller,
            // which keeps the daily limit check exact.
            users::table
                .find(req.caller_id)
                .select(users::id)
                .for_update()
                .first::<i64>(conn)
                .optional()?
                .ok_or(CrmError::CallerNotFound(req.caller_id))?;

            if req.outcome != CallOutcome::Converted {
                plan_transition(
                    &snapshot(&lead)?,
                    StageRequest::CallOutcome {
                        outcome: req.outcome,
                        explicit: req.new_lead_stage,
                    },
                    now,
                )?;
            }

            if let Some(limit) = self.config.daily_call_limit {
                let made: i64 = call_logs::table
                    .filter(call_logs::caller_id.eq(req.caller_id))
                    .filter(call_logs::stat_date.eq(stat_date))
                    .count()
                    .get_result(conn)?;
                if made >= i64::from(limit) {
                    warn!(
                        "Telecaller {} hit the daily limit of {limit} calls on {stat_date}",
                        req.caller_id
                    );
                    return Err(CrmError::CallLimitReached {
                        telecaller_id: req.caller_id,
                        limit,
                    });
                }
            }

            let row = NewDbCallLog {
                lead_id: req.lead_id,
                caller_id: req.caller_id,
                call_date,
                stat_date,
                outcome: req.outcome.to_string(),
                duration_seconds,
                next_followup_date,
                notes: non_blank(req.notes.clone()),
                requested_stage: req.new_lead_stage.map(|stage| stage.to_string()),
                requested_by_role: role.to_string(),
                created_at: now,
            };
            Ok(diesel::insert_into(call_logs::table)
                .values(&row)
                .returning(DbCallLog::as_returning())
                .get_result(conn)?)
        })?;

        info!(
            "Logged call {} on lead {} by caller {} ({})",
            logged.id, logged.lead_id, logged.caller_id, logged.outcome
        );

        apply_effects(&mut conn, logged.id, Utc::now()).map_err(|e| {
            error!("Call {} logged but effects not applied: {e}", logged.id);
            CrmError::EffectsPending {
                call_log_id: logged.id,
                reason: e.to_string(),
            }
        })
    }

    /// Re-runs the stage and stats step for one call log.
    pub fn reconcile_call(&self, call_log_id: i64) -> Result<RecordedCall, CrmError> {
        let mut conn = self.pool.get()?;
        apply_effects(&mut conn, call_log_id, Utc::now())
    }

    /// Applies the oldest pending call logs, reporting each outcome.
    pub fn reconcile_pending(&self, limit: Option<i64>) -> Result<ReconcileReport, CrmError> {
        let limit = self.config.page_limit(limit);
        let mut conn = self.pool.get()?;
        let pending: Vec<i64> = call_logs::table
            .filter(call_logs::effects_applied_at.is_null())
            .order((call_logs::created_at.asc(), call_logs::id.asc()))
            .limit(limit)
            .select(call_logs::id)
            .load(&mut conn)?;

        let mut report = ReconcileReport::default();
        for call_log_id in pending {
            match apply_effects(&mut conn, call_log_id, Utc::now()) {
                Ok(_) => report.applied.push(call_log_id),
                Err(e) => {
                    error!("Reconciling call {call_log_id} failed: {e}");
                    report.failed.push(ReconcileFailure {
                        call_log_id,
                        message: e.to_string(),
                    });
                }
            }
        }
        if !report.applied.is_empty() {
            info!("Reconciled {} pending call logs", report.applied.len());
        }
        Ok(report)
    }

    pub fn list_call_logs(&self, lead_id: i64) -> Result<Vec<CallLogEntry>, CrmError> {
        let mut conn = self.pool.get()?;
        if find_lead(&mut conn, lead_id)?.is_none() {
            return Err(CrmError::LeadNotFound(lead_id));
        }
        let rows: Vec<DbCallLog> = call_logs::table
            .filter(call_logs::lead_id.eq(lead_id))
            .order((call_logs::call_date.desc(), call_logs::id.desc()))
            .select(DbCallLog::as_select())
            .load(&mut conn)?;
        db_call_logs_to_entries(rows)
    }

    pub fn list_by_caller(
        &self,
        caller_id: i64,
        date: Option<&str>,
    ) -> Result<Vec<CallLogEntry>, CrmError> {
        let stat_date = date.map(|d| parse_date("date", d)).transpose()?;
        let mut conn = self.pool.get()?;
        let mut q = call_logs::table
            .filter(call_logs::caller_id.eq(caller_id))
            .select(DbCallLog::as_select())
            .into_boxed();
        if let Some(stat_date) = stat_date {
            q = q.filter(call_logs::stat_date.eq(stat_date));
        }
        let rows = q
            .order((call_logs::call_date.desc(), call_logs::id.desc()))
            .load(&mut conn)?;
        db_call_logs_to_entries(rows)
    }

    /// Duration and notes may be corrected until the call has been counted.
    pub fn correct_call_log(
        &self,
        call_log_id: i64,
        req: CorrectCallLogRequest,
    ) -> Result<CallLogEntry, CrmError> {
        if req.duration_seconds.is_none() && req.notes.is_none() {
            return Err(CrmError::Validation("Nothing to correct".to_string()));
        }
        let duration_seconds = validate_duration(req.duration_seconds)?;

        let mut conn = self.pool.get()?;
        conn.transaction::<_, CrmError, _>(|conn| {
            let log = lock_call_log(conn, call_log_id)?;
            if log.effects_applied_at.is_some() {
                return Err(CrmError::Validation(format!(
                    "Call {call_log_id} is already counted in daily stats and cannot be corrected"
                )));
            }
            if let Some(seconds) = duration_seconds {
                diesel::update(call_logs::table.find(call_log_id))
                    .set(call_logs::duration_seconds.eq(Some(seconds)))
                    .execute(conn)?;
            }
            if let Some(notes) = req.notes.clone() {
                diesel::update(call_logs::table.find(call_log_id))
                    .set(call_logs::notes.eq(non_blank(Some(notes))))
                    .execute(conn)?;
            }
            info!("Corrected pending call log {call_log_id}");
            db_call_log_to_entry(lock_call_log(conn, call_log_id)?)
        })
    }
}

fn lock_call_log(conn: &mut PgConnection, call_log_id: i64) -> Result<DbCallLog, CrmError> {
    call_logs::table
        .find(call_log_id)
        .select(DbCallLog::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or_else(|| CrmError::NotFound(format!("Call log {call_log_id} not found")))
}

/// Stage transition and stats rollup for one logged call, at most once.
pub fn apply_effects(
    conn: &mut PgConnection,
    call_log_id: i64,
    now: DateTime<Utc>,
) -> Result<RecordedCall, CrmError> {
    conn.transaction::<_, CrmError, _>(|conn| {
        let log = lock_call_log(conn, call_log_id)?;
        let lead = lock_lead(conn, log.lead_id)?;

        if log.effects_applied_at.is_some() {
            let stats = find_daily_stats(conn, log.caller_id, log.stat_date)?.ok_or_else(|| {
                CrmError::Internal(format!(
                    "Call {call_log_id} is marked applied but has no stats row"
                ))
            })?;
            return Ok(RecordedCall {
                call_log: db_call_log_to_entry(log)?,
                lead: db_lead_to_lead(lead)?,
                stats,
            });
        }

        let outcome: CallOutcome = log.outcome.parse()?;
        let requested: Option<LeadStage> = log
            .requested_stage
            .as_deref()
            .map(str::parse)
            .transpose()?;
        let request = StageRequest::CallOutcome {
            outcome,
            explicit: requested,
        };
        // The lead may have moved since the call was logged; a request that no
        // longer applies is dropped but the call still counts.
        match plan_transition(&snapshot(&lead)?, request, now) {
            Ok(plan) if plan.changed => write_stage(conn, lead.id, &plan, now)?,
            Ok(_) => {}
            Err(e) => warn!("Call {call_log_id}: requested stage not applied to lead {}: {e}", lead.id),
        }

        let stats = upsert_daily_stats(
            conn,
            log.caller_id,
            log.stat_date,
            StatsDelta::for_call(outcome, log.duration_seconds),
            now,
        )?;

        let applied: DbCallLog = diesel::update(call_logs::table.find(call_log_id))
            .set(call_logs::effects_applied_at.eq(Some(now)))
            .returning(DbCallLog::as_returning())
            .get_result(conn)?;

        Ok(RecordedCall {
            call_log: db_call_log_to_entry(applied)?,
            lead: db_lead_to_lead(lock_lead(conn, log.lead_id)?)?,
            stats,
        })
    })
}

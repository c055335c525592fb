use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;

use crate::core::shared::schema::{call_logs, daily_call_stats, leads};

use super::error::CrmError;
use super::types::{CallLogEntry, DailyCallStats, Lead};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = leads)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbLead {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub whatsapp: Option<String>,
    pub lead_source: String,
    pub lead_stage: String,
    pub lead_status: String,
    pub course_interest_id: Option<i64>,
    pub assigned_telecaller_id: Option<i64>,
    pub assigned_counselor_id: Option<i64>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub notes: Option<String>,
    pub conversion_date: Option<DateTime<Utc>>,
    pub lost_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = leads)]
pub struct NewDbLead {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub whatsapp: Option<String>,
    pub lead_source: String,
    pub lead_stage: String,
    pub lead_status: String,
    pub course_interest_id: Option<i64>,
    pub assigned_telecaller_id: Option<i64>,
    pub assigned_counselor_id: Option<i64>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub notes: Option<String>,
    pub conversion_date: Option<DateTime<Utc>>,
    pub lost_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update of the non-stage lead columns. `None` leaves a column as is;
/// `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = leads)]
pub struct LeadChanges {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<Option<String>>,
    pub whatsapp: Option<Option<String>>,
    pub lead_source: Option<String>,
    pub lead_status: Option<String>,
    pub course_interest_id: Option<Option<i64>>,
    pub assigned_telecaller_id: Option<Option<i64>>,
    pub assigned_counselor_id: Option<Option<i64>>,
    pub address: Option<Option<String>>,
    pub city: Option<Option<String>>,
    pub state: Option<Option<String>>,
    pub pincode: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = leads)]
#[diesel(treat_none_as_null = true)]
pub struct StageChanges {
    pub lead_stage: String,
    pub conversion_date: Option<DateTime<Utc>>,
    pub lost_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = call_logs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbCallLog {
    pub id: i64,
    pub lead_id: i64,
    pub caller_id: i64,
    pub call_date: DateTime<Utc>,
    pub stat_date: NaiveDate,
    pub outcome: String,
    pub duration_seconds: Option<i32>,
    pub next_followup_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub requested_stage: Option<String>,
    pub requested_by_role: String,
    pub effects_applied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = call_logs)]
pub struct NewDbCallLog {
    pub lead_id: i64,
    pub caller_id: i64,
    pub call_date: DateTime<Utc>,
    pub stat_date: NaiveDate,
    pub outcome: String,
    pub duration_seconds: Option<i32>,
    pub next_followup_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub requested_stage: Option<String>,
    pub requested_by_role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = daily_call_stats)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbDailyStats {
    pub id: i64,
    pub telecaller_id: i64,
    pub stat_date: NaiveDate,
    pub calls_made: i32,
    pub calls_answered: i32,
    pub total_duration_seconds: i64,
    pub leads_contacted: i32,
    pub leads_converted: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = daily_call_stats)]
pub struct NewDbDailyStats {
    pub telecaller_id: i64,
    pub stat_date: NaiveDate,
    pub calls_made: i32,
    pub calls_answered: i32,
    pub total_duration_seconds: i64,
    pub leads_contacted: i32,
    pub leads_converted: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Enum columns are guarded by CHECK constraints, so a parse failure here means
// the row was written outside this service.
fn parse_column<T>(column: &str, value: &str) -> Result<T, CrmError>
where
    T: std::str::FromStr<Err = CrmError>,
{
    value
        .parse()
        .map_err(|_| CrmError::Internal(format!("Unexpected {column} value in storage: {value}")))
}

pub fn db_lead_to_lead(db: DbLead) -> Result<Lead, CrmError> {
    Ok(Lead {
        id: db.id,
        name: db.name,
        phone: db.phone,
        email: db.email,
        whatsapp: db.whatsapp,
        lead_source: parse_column("lead_source", &db.lead_source)?,
        lead_stage: parse_column("lead_stage", &db.lead_stage)?,
        lead_status: parse_column("lead_status", &db.lead_status)?,
        course_interest_id: db.course_interest_id,
        assigned_telecaller_id: db.assigned_telecaller_id,
        assigned_counselor_id: db.assigned_counselor_id,
        address: db.address,
        city: db.city,
        state: db.state,
        pincode: db.pincode,
        notes: db.notes,
        conversion_date: db.conversion_date,
        lost_reason: db.lost_reason,
        created_at: db.created_at,
        updated_at: db.updated_at,
    })
}

pub fn db_call_log_to_entry(db: DbCallLog) -> Result<CallLogEntry, CrmError> {
    let requested_stage = match db.requested_stage.as_deref() {
        Some(stage) => Some(parse_column("requested_stage", stage)?),
        None => None,
    };
    Ok(CallLogEntry {
        id: db.id,
        lead_id: db.lead_id,
        caller_id: db.caller_id,
        call_date: db.call_date,
        stat_date: db.stat_date,
        outcome: parse_column("outcome", &db.outcome)?,
        duration_seconds: db.duration_seconds,
        next_followup_date: db.next_followup_date,
        notes: db.notes,
        requested_stage,
        effects_applied_at: db.effects_applied_at,
        created_at: db.created_at,
    })
}

pub fn db_stats_to_stats(db: DbDailyStats) -> DailyCallStats {
    DailyCallStats {
        id: db.id,
        telecaller_id: db.telecaller_id,
        stat_date: db.stat_date,
        calls_made: db.calls_made,
        calls_answered: db.calls_answered,
        total_duration_seconds: db.total_duration_seconds,
        leads_contacted: db.leads_contacted,
        leads_converted: db.leads_converted,
        created_at: db.created_at,
        updated_at: db.updated_at,
    }
}

pub fn db_leads_to_leads(rows: Vec<DbLead>) -> Result<Vec<Lead>, CrmError> {
    rows.into_iter().map(db_lead_to_lead).collect()
}

pub fn db_call_logs_to_entries(rows: Vec<DbCallLog>) -> Result<Vec<CallLogEntry>, CrmError> {
    rows.into_iter().map(db_call_log_to_entry).collect()
}

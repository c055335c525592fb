use chrono::{DateTime, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use log::{info, warn};

use crate::core::config::EngagementConfig;
use crate::core::shared::schema::{call_logs, courses, leads, users};
use crate::core::shared::utils::DbPool;

use super::error::{is_unique_violation, CrmError};
use super::import::import_leads;
use super::stage::{plan_transition, StagePlan, StageRequest, StageSnapshot};
use super::storage::{db_lead_to_lead, db_leads_to_leads, DbLead, LeadChanges, NewDbLead, StageChanges};
use super::types::{
    CreateLeadRequest, ImportResult, Lead, LeadListQuery, LeadListResponse, LeadSource, LeadStage, LeadSummary,
    SetStageRequest, UpdateLeadRequest, UserRole,
};
use super::validation::{non_blank, normalize_phone, validate_email, validate_name};

/// Owns lead rows: admission, patching, stage changes and removal.
#[derive(Clone)]
pub struct LeadRegistry {
    pool: DbPool,
    config: EngagementConfig,
}

impl LeadRegistry {
    pub fn new(pool: DbPool, config: EngagementConfig) -> Self {
        Self { pool, config }
    }

    pub fn create_lead(&self, req: CreateLeadRequest) -> Result<Lead, CrmError> {
        let mut conn = self.pool.get()?;
        create_lead_with(&mut conn, req, LeadSource::Other, Utc::now())
    }

    pub fn import_leads(&self, rows: Vec<CreateLeadRequest>) -> Result<ImportResult, CrmError> {
        let mut conn = self.pool.get()?;
        Ok(import_leads(&mut conn, rows))
    }

    pub fn get_lead(&self, id: i64) -> Result<Lead, CrmError> {
        let mut conn = self.pool.get()?;
        let row = find_lead(&mut conn, id)?.ok_or(CrmError::LeadNotFound(id))?;
        db_lead_to_lead(row)
    }

    pub fn list_leads(&self, query: &LeadListQuery) -> Result<LeadListResponse, CrmError> {
        let mut conn = self.pool.get()?;
        let limit = self.config.page_limit(query.limit);
        let offset = query.offset.unwrap_or(0).max(0);

        let total: i64 = filtered_leads(query).count().get_result(&mut conn)?;
        let rows: Vec<DbLead> = filtered_leads(query)
            .order((leads::created_at.desc(), leads::id.desc()))
            .limit(limit)
            .offset(offset)
            .select(DbLead::as_select())
            .load(&mut conn)?;

        Ok(LeadListResponse {
            leads: db_leads_to_leads(rows)?,
            total,
            limit,
            offset,
        })
    }

    pub fn update_lead(
        &self,
        id: i64,
        patch: UpdateLeadRequest,
        role: UserRole,
    ) -> Result<Lead, CrmError> {
        let provided = patch.provided_fields();
        if provided.is_empty() {
            return Err(CrmError::Validation("No fields to update".to_string()));
        }
        ensure_fields_writable(&provided, role)?;

        let mut conn = self.pool.get()?;
        let now = Utc::now();
        conn.transaction::<_, CrmError, _>(|conn| {
            let current = lock_lead(conn, id)?;
            let changes = build_changes(conn, &current, &patch, now)?;

            if let Some(ref phone) = changes.phone {
                if let Some(existing) = find_by_phone(conn, phone, Some(id))? {
                    return Err(duplicate(existing)?);
                }
            }

            let updated = conn.transaction(|conn| {
                diesel::update(leads::table.find(id))
                    .set(&changes)
                    .execute(conn)
            });
            match updated {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    return Err(duplicate_for_phone(conn, changes.phone.as_deref(), Some(id)));
                }
                Err(e) => return Err(e.into()),
            }

            if patch.touches_stage() {
                let request = StageRequest::Explicit {
                    stage: patch.lead_stage.unwrap_or(snapshot(&current)?.stage),
                    lost_reason: non_blank(patch.lost_reason.clone()),
                    conversion_date: patch.conversion_date,
                };
                apply_stage(conn, &current, request, now)?;
            }

            info!("Updated lead {id} fields [{}] by {role}", provided.join(", "));
            db_lead_to_lead(lock_lead(conn, id)?)
        })
    }

    /// The narrow stage operation; any tier may move a lead's stage.
    pub fn set_stage(&self, id: i64, req: SetStageRequest, role: UserRole) -> Result<Lead, CrmError> {
        let mut conn = self.pool.get()?;
        let now = Utc::now();
        conn.transaction::<_, CrmError, _>(|conn| {
            let current = lock_lead(conn, id)?;
            let plan = apply_stage(
                conn,
                &current,
                StageRequest::Explicit {
                    stage: req.lead_stage,
                    lost_reason: non_blank(req.lost_reason.clone()),
                    conversion_date: None,
                },
                now,
            )?;
            if plan.changed {
                info!("Lead {id} stage set to {} by {role}", plan.stage);
            }
            db_lead_to_lead(lock_lead(conn, id)?)
        })
    }

    pub fn delete_lead(&self, id: i64, role: UserRole) -> Result<(), CrmError> {
        if !role.can_delete_leads() {
            return Err(CrmError::Forbidden(format!("{role} cannot delete leads")));
        }
        let mut conn = self.pool.get()?;
        conn.transaction::<_, CrmError, _>(|conn| {
            lock_lead(conn, id)?;
            let calls: i64 = call_logs::table
                .filter(call_logs::lead_id.eq(id))
                .count()
                .get_result(conn)?;
            if calls > 0 {
                return Err(CrmError::Validation(format!(
                    "Lead {id} has {calls} call log entries and cannot be deleted"
                )));
            }
            diesel::delete(leads::table.find(id)).execute(conn)?;
            warn!("Lead {id} deleted by {role}");
            Ok(())
        })
    }
}

/// Inserts one lead. Used by both manual intake and bulk import so that every
/// producer goes through the same duplicate check.
pub fn create_lead_with(
    conn: &mut PgConnection,
    req: CreateLeadRequest,
    default_source: LeadSource,
    now: DateTime<Utc>,
) -> Result<Lead, CrmError> {
    let name = validate_name(&req.name)?;
    let phone = normalize_phone(&req.phone)?;
    let email = validate_email(req.email.as_deref())?;
    ensure_references(
        conn,
        req.course_interest_id,
        req.assigned_telecaller_id,
        req.assigned_counselor_id,
    )?;

    let initial = StageSnapshot {
        stage: LeadStage::New,
        conversion_date: None,
        lost_reason: None,
    };
    let plan = plan_transition(
        &initial,
        StageRequest::Explicit {
            stage: req.lead_stage.unwrap_or_default(),
            lost_reason: non_blank(req.lost_reason),
            conversion_date: None,
        },
        now,
    )?;

    if let Some(existing) = find_by_phone(conn, &phone, None)? {
        return Err(duplicate(existing)?);
    }

    let new_lead = NewDbLead {
        name,
        phone: phone.clone(),
        email,
        whatsapp: non_blank(req.whatsapp),
        lead_source: req.lead_source.unwrap_or(default_source).to_string(),
        lead_stage: plan.stage.to_string(),
        lead_status: req.lead_status.unwrap_or_default().to_string(),
        course_interest_id: req.course_interest_id,
        assigned_telecaller_id: req.assigned_telecaller_id,
        assigned_counselor_id: req.assigned_counselor_id,
        address: non_blank(req.address),
        city: non_blank(req.city),
        state: non_blank(req.state),
        pincode: non_blank(req.pincode),
        notes: non_blank(req.notes),
        conversion_date: plan.conversion_date,
        lost_reason: plan.lost_reason,
        created_at: now,
        updated_at: now,
    };

    // The unique constraint on phone is the real guard; the lookup above only
    // produces a friendlier error for the common case.
    let inserted = conn.transaction(|conn| {
        diesel::insert_into(leads::table)
            .values(&new_lead)
            .returning(DbLead::as_returning())
            .get_result(conn)
    });
    match inserted {
        Ok(row) => {
            info!("Created lead {} ({})", row.id, row.lead_stage);
            db_lead_to_lead(row)
        }
        Err(e) if is_unique_violation(&e) => Err(duplicate_for_phone(conn, Some(&phone), None)),
        Err(e) => Err(e.into()),
    }
}

/// ILIKE pattern matching `search` literally anywhere in the column.
fn contains_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn filtered_leads(query: &LeadListQuery) -> leads::BoxedQuery<'static, Pg> {
    let mut q = leads::table.into_boxed();

    if let Some(ref search) = query.search {
        let search = search.trim();
        if !search.is_empty() {
            let pattern = contains_pattern(search);
            q = q.filter(
                leads::name
                    .ilike(pattern.clone())
                    .or(leads::phone.ilike(pattern.clone()))
                    .or(leads::email.ilike(pattern)),
            );
        }
    }
    if let Some(stage) = query.stage {
        q = q.filter(leads::lead_stage.eq(stage.as_str()));
    }
    if let Some(status) = query.status {
        q = q.filter(leads::lead_status.eq(status.as_str()));
    }
    if let Some(source) = query.source {
        q = q.filter(leads::lead_source.eq(source.as_str()));
    }
    if let Some(telecaller_id) = query.assigned_telecaller_id {
        q = q.filter(leads::assigned_telecaller_id.eq(telecaller_id));
    }
    if let Some(counselor_id) = query.assigned_counselor_id {
        q = q.filter(leads::assigned_counselor_id.eq(counselor_id));
    }
    if let Some(course_id) = query.course_interest_id {
        q = q.filter(leads::course_interest_id.eq(course_id));
    }
    q
}

pub fn find_lead(conn: &mut PgConnection, id: i64) -> Result<Option<DbLead>, CrmError> {
    Ok(leads::table
        .find(id)
        .select(DbLead::as_select())
        .first(conn)
        .optional()?)
}

/// Loads a lead with a row lock held until the surrounding transaction ends.
pub fn lock_lead(conn: &mut PgConnection, id: i64) -> Result<DbLead, CrmError> {
    leads::table
        .find(id)
        .select(DbLead::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or(CrmError::LeadNotFound(id))
}

fn find_by_phone(
    conn: &mut PgConnection,
    phone: &str,
    exclude_id: Option<i64>,
) -> Result<Option<DbLead>, CrmError> {
    let mut q = leads::table
        .filter(leads::phone.eq(phone))
        .select(DbLead::as_select())
        .into_boxed();
    if let Some(id) = exclude_id {
        q = q.filter(leads::id.ne(id));
    }
    Ok(q.first(conn).optional()?)
}

fn duplicate(existing: DbLead) -> Result<CrmError, CrmError> {
    let lead = db_lead_to_lead(existing)?;
    info!("Rejected duplicate phone, already on lead {}", lead.id);
    Ok(CrmError::DuplicatePhone {
        existing: LeadSummary::from(&lead),
    })
}

/// Resolves a unique violation raised by the database into the conflicting lead.
fn duplicate_for_phone(conn: &mut PgConnection, phone: Option<&str>, exclude_id: Option<i64>) -> CrmError {
    let Some(phone) = phone else {
        return CrmError::Validation("Phone number already in use".to_string());
    };
    match find_by_phone(conn, phone, exclude_id) {
        Ok(Some(existing)) => duplicate(existing).unwrap_or_else(|e| e),
        Ok(None) => CrmError::Validation("Phone number already in use".to_string()),
        Err(e) => e,
    }
}

pub fn ensure_fields_writable(fields: &[&str], role: UserRole) -> Result<(), CrmError> {
    let restricted: Vec<String> = fields
        .iter()
        .filter(|field| !role.can_write_field(field))
        .map(|field| field.to_string())
        .collect();
    if restricted.is_empty() {
        Ok(())
    } else {
        warn!("{role} attempted to write restricted fields [{}]", restricted.join(", "));
        Err(CrmError::FieldRestricted { fields: restricted })
    }
}

pub fn user_exists(conn: &mut PgConnection, id: i64) -> Result<bool, CrmError> {
    Ok(diesel::select(diesel::dsl::exists(users::table.filter(users::id.eq(id)))).get_result(conn)?)
}

fn ensure_references(
    conn: &mut PgConnection,
    course_interest_id: Option<i64>,
    assigned_telecaller_id: Option<i64>,
    assigned_counselor_id: Option<i64>,
) -> Result<(), CrmError> {
    if let Some(course_id) = course_interest_id {
        let found: bool = diesel::select(diesel::dsl::exists(
            courses::table.filter(courses::id.eq(course_id)),
        ))
        .get_result(conn)?;
        if !found {
            return Err(CrmError::Validation(format!("Course {course_id} does not exist")));
        }
    }
    for (field, user_id) in [
        ("assignedTelecallerId", assigned_telecaller_id),
        ("assignedCounselorId", assigned_counselor_id),
    ] {
        if let Some(user_id) = user_id {
            if !user_exists(conn, user_id)? {
                return Err(CrmError::Validation(format!("{field}: user {user_id} does not exist")));
            }
        }
    }
    Ok(())
}

fn build_changes(
    conn: &mut PgConnection,
    current: &DbLead,
    patch: &UpdateLeadRequest,
    now: DateTime<Utc>,
) -> Result<LeadChanges, CrmError> {
    let name = patch.name.as_deref().map(validate_name).transpose()?;
    let phone = match patch.phone.as_deref() {
        Some(raw) => {
            let phone = normalize_phone(raw)?;
            (phone != current.phone).then_some(phone)
        }
        None => None,
    };
    let email = match patch.email.as_deref() {
        Some(raw) => Some(validate_email(Some(raw))?),
        None => None,
    };
    ensure_references(
        conn,
        patch.course_interest_id.flatten(),
        patch.assigned_telecaller_id.flatten(),
        patch.assigned_counselor_id.flatten(),
    )?;

    let text = |value: &Option<String>| value.clone().map(|v| non_blank(Some(v)));
    Ok(LeadChanges {
        name,
        phone,
        email,
        whatsapp: text(&patch.whatsapp),
        lead_source: patch.lead_source.map(|s| s.to_string()),
        lead_status: patch.lead_status.map(|s| s.to_string()),
        course_interest_id: patch.course_interest_id,
        assigned_telecaller_id: patch.assigned_telecaller_id,
        assigned_counselor_id: patch.assigned_counselor_id,
        address: text(&patch.address),
        city: text(&patch.city),
        state: text(&patch.state),
        pincode: text(&patch.pincode),
        notes: text(&patch.notes),
        updated_at: Some(now),
    })
}

pub fn snapshot(lead: &DbLead) -> Result<StageSnapshot, CrmError> {
    Ok(StageSnapshot {
        stage: lead.lead_stage.parse().map_err(|_| {
            CrmError::Internal(format!("Unexpected lead_stage value in storage: {}", lead.lead_stage))
        })?,
        conversion_date: lead.conversion_date,
        lost_reason: lead.lost_reason.clone(),
    })
}

/// Plans and writes a stage change for a locked lead row.
pub fn apply_stage(
    conn: &mut PgConnection,
    current: &DbLead,
    request: StageRequest,
    now: DateTime<Utc>,
) -> Result<StagePlan, CrmError> {
    let plan = plan_transition(&snapshot(current)?, request, now)?;
    if plan.changed {
        write_stage(conn, current.id, &plan, now)?;
    }
    Ok(plan)
}

/// The only writer of `lead_stage`, `conversion_date` and `lost_reason`.
pub fn write_stage(
    conn: &mut PgConnection,
    lead_id: i64,
    plan: &StagePlan,
    now: DateTime<Utc>,
) -> Result<(), CrmError> {
    diesel::update(leads::table.find(lead_id))
        .set(&StageChanges {
            lead_stage: plan.stage.to_string(),
            conversion_date: plan.conversion_date,
            lost_reason: plan.lost_reason.clone(),
            updated_at: now,
        })
        .execute(conn)?;
    info!("Lead {lead_id} moved to stage {}", plan.stage);
    Ok(())
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::error::CrmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStage {
    New,
    Contacted,
    Qualified,
    DemoScheduled,
    ProposalSent,
    Negotiation,
    Converted,
    Lost,
}

impl LeadStage {
    pub const ALL: [LeadStage; 8] = [
        Self::New,
        Self::Contacted,
        Self::Qualified,
        Self::DemoScheduled,
        Self::ProposalSent,
        Self::Negotiation,
        Self::Converted,
        Self::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Qualified => "qualified",
            Self::DemoScheduled => "demo_scheduled",
            Self::ProposalSent => "proposal_sent",
            Self::Negotiation => "negotiation",
            Self::Converted => "converted",
            Self::Lost => "lost",
        }
    }

    /// No operation moves a lead out of a terminal stage on request.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Converted | Self::Lost)
    }

    /// Stages where the lead is being worked but has not reached a decision.
    pub fn is_active_engagement(&self) -> bool {
        matches!(
            self,
            Self::Contacted
                | Self::Qualified
                | Self::DemoScheduled
                | Self::ProposalSent
                | Self::Negotiation
        )
    }
}

impl std::fmt::Display for LeadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LeadStage {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| CrmError::Validation(format!("Unknown lead stage: {s}")))
    }
}

impl Default for LeadStage {
    fn default() -> Self {
        Self::New
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Active,
    Inactive,
    Junk,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Junk => "junk",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "junk" => Ok(Self::Junk),
            _ => Err(CrmError::Validation(format!("Unknown lead status: {s}"))),
        }
    }
}

impl Default for LeadStatus {
    fn default() -> Self {
        Self::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Website,
    Referral,
    WalkIn,
    SocialMedia,
    Advertisement,
    ColdCall,
    Import,
    Other,
}

impl LeadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Website => "website",
            Self::Referral => "referral",
            Self::WalkIn => "walk_in",
            Self::SocialMedia => "social_media",
            Self::Advertisement => "advertisement",
            Self::ColdCall => "cold_call",
            Self::Import => "import",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for LeadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LeadSource {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "website" => Ok(Self::Website),
            "referral" => Ok(Self::Referral),
            "walk_in" => Ok(Self::WalkIn),
            "social_media" => Ok(Self::SocialMedia),
            "advertisement" => Ok(Self::Advertisement),
            "cold_call" => Ok(Self::ColdCall),
            "import" => Ok(Self::Import),
            "other" => Ok(Self::Other),
            _ => Err(CrmError::Validation(format!("Unknown lead source: {s}"))),
        }
    }
}

impl Default for LeadSource {
    fn default() -> Self {
        Self::Other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    NoAnswer,
    Busy,
    Answered,
    CallbackRequested,
    NotInterested,
    Interested,
    Converted,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAnswer => "no_answer",
            Self::Busy => "busy",
            Self::Answered => "answered",
            Self::CallbackRequested => "callback_requested",
            Self::NotInterested => "not_interested",
            Self::Interested => "interested",
            Self::Converted => "converted",
        }
    }

    /// Outcomes counted toward `callsAnswered`.
    pub fn is_answered(&self) -> bool {
        matches!(self, Self::Answered | Self::Interested | Self::Converted)
    }

    pub fn is_conversion(&self) -> bool {
        matches!(self, Self::Converted)
    }
}

impl std::fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CallOutcome {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_answer" => Ok(Self::NoAnswer),
            "busy" => Ok(Self::Busy),
            "answered" => Ok(Self::Answered),
            "callback_requested" => Ok(Self::CallbackRequested),
            "not_interested" => Ok(Self::NotInterested),
            "interested" => Ok(Self::Interested),
            "converted" => Ok(Self::Converted),
            _ => Err(CrmError::Validation(format!("Unknown call outcome: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Manager,
    Counselor,
    Telecaller,
}

/// What a caller may write, derived from the session role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CapabilityTier {
    Base,
    Elevated,
    Admin,
}

/// Lead fields a base-tier caller may patch.
pub const BASE_TIER_WRITABLE_FIELDS: [&str; 2] = ["notes", "leadStage"];

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Counselor => "counselor",
            Self::Telecaller => "telecaller",
        }
    }

    pub fn tier(&self) -> CapabilityTier {
        match self {
            Self::Admin => CapabilityTier::Admin,
            Self::Manager | Self::Counselor => CapabilityTier::Elevated,
            Self::Telecaller => CapabilityTier::Base,
        }
    }

    pub fn can_write_field(&self, field: &str) -> bool {
        self.tier() >= CapabilityTier::Elevated || BASE_TIER_WRITABLE_FIELDS.contains(&field)
    }

    pub fn can_delete_leads(&self) -> bool {
        self.tier() == CapabilityTier::Admin
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "counselor" => Ok(Self::Counselor),
            "telecaller" => Ok(Self::Telecaller),
            _ => Err(CrmError::Validation(format!("Unknown role: {s}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub whatsapp: Option<String>,
    pub lead_source: LeadSource,
    pub lead_stage: LeadStage,
    pub lead_status: LeadStatus,
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

/// The part of an existing lead returned with a duplicate-phone rejection, so
/// the caller can merge instead of retrying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadSummary {
    pub id: i64,
    pub name: String,
    pub lead_stage: LeadStage,
    pub lead_status: LeadStatus,
    pub assigned_telecaller_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<&Lead> for LeadSummary {
    fn from(lead: &Lead) -> Self {
        Self {
            id: lead.id,
            name: lead.name.clone(),
            lead_stage: lead.lead_stage,
            lead_status: lead.lead_status,
            assigned_telecaller_id: lead.assigned_telecaller_id,
            created_at: lead.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLeadRequest {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub whatsapp: Option<String>,
    pub lead_source: Option<LeadSource>,
    pub lead_stage: Option<LeadStage>,
    pub lead_status: Option<LeadStatus>,
    pub course_interest_id: Option<i64>,
    pub assigned_telecaller_id: Option<i64>,
    pub assigned_counselor_id: Option<i64>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub notes: Option<String>,
    pub lost_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLeadRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub whatsapp: Option<String>,
    pub lead_source: Option<LeadSource>,
    pub lead_stage: Option<LeadStage>,
    pub lead_status: Option<LeadStatus>,
    /// `null` clears the reference, an absent key leaves it unchanged.
    #[serde(default, deserialize_with = "present_or_null")]
    pub course_interest_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub assigned_telecaller_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub assigned_counselor_id: Option<Option<i64>>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub notes: Option<String>,
    pub conversion_date: Option<DateTime<Utc>>,
    pub lost_reason: Option<String>,
}

fn present_or_null<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl UpdateLeadRequest {
    /// Wire names of the fields present in the patch.
    pub fn provided_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        let mut mark = |present: bool, name: &'static str| {
            if present {
                fields.push(name);
            }
        };
        mark(self.name.is_some(), "name");
        mark(self.phone.is_some(), "phone");
        mark(self.email.is_some(), "email");
        mark(self.whatsapp.is_some(), "whatsapp");
        mark(self.lead_source.is_some(), "leadSource");
        mark(self.lead_stage.is_some(), "leadStage");
        mark(self.lead_status.is_some(), "leadStatus");
        mark(self.course_interest_id.is_some(), "courseInterestId");
        mark(self.assigned_telecaller_id.is_some(), "assignedTelecallerId");
        mark(self.assigned_counselor_id.is_some(), "assignedCounselorId");
        mark(self.address.is_some(), "address");
        mark(self.city.is_some(), "city");
        mark(self.state.is_some(), "state");
        mark(self.pincode.is_some(), "pincode");
        mark(self.notes.is_some(), "notes");
        mark(self.conversion_date.is_some(), "conversionDate");
        mark(self.lost_reason.is_some(), "lostReason");
        fields
    }

    pub fn touches_stage(&self) -> bool {
        self.lead_stage.is_some() || self.conversion_date.is_some() || self.lost_reason.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStageRequest {
    pub lead_stage: LeadStage,
    pub lost_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadListQuery {
    pub search: Option<String>,
    pub stage: Option<LeadStage>,
    pub status: Option<LeadStatus>,
    pub source: Option<LeadSource>,
    pub assigned_telecaller_id: Option<i64>,
    pub assigned_counselor_id: Option<i64>,
    pub course_interest_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadListResponse {
    pub leads: Vec<Lead>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportLeadsRequest {
    pub rows: Vec<CreateLeadRequest>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub imported_count: i32,
    pub duplicate_count: i32,
    pub error_count: i32,
    pub lead_ids: Vec<i64>,
    pub errors: Vec<ImportRowError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRowError {
    /// 1-based position in the submitted rows.
    pub row: usize,
    pub message: String,
    pub duplicate_of: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallLogEntry {
    pub id: i64,
    pub lead_id: i64,
    pub caller_id: i64,
    pub call_date: DateTime<Utc>,
    pub stat_date: NaiveDate,
    pub outcome: CallOutcome,
    pub duration_seconds: Option<i32>,
    pub next_followup_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub requested_stage: Option<LeadStage>,
    pub effects_applied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCallRequest {
    pub lead_id: i64,
    pub caller_id: i64,
    pub call_date: String,
    pub outcome: CallOutcome,
    pub duration_seconds: Option<i64>,
    pub next_followup_date: Option<String>,
    pub notes: Option<String>,
    pub new_lead_stage: Option<LeadStage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedCall {
    pub call_log: CallLogEntry,
    pub lead: Lead,
    pub stats: DailyCallStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectCallLogRequest {
    pub duration_seconds: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallLogQuery {
    pub caller_id: i64,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub applied: Vec<i64>,
    pub failed: Vec<ReconcileFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileFailure {
    pub call_log_id: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCallStats {
    pub id: i64,
    pub telecaller_id: i64,
    /// Calendar day in the reference time zone, `YYYY-MM-DD` on the wire.
    pub stat_date: NaiveDate,
    pub calls_made: i32,
    pub calls_answered: i32,
    pub total_duration_seconds: i64,
    /// Counts call events, not distinct leads.
    pub leads_contacted: i32,
    pub leads_converted: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRangeQuery {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_calls: i64,
    pub total_answered: i64,
    pub total_duration: i64,
    pub total_contacted: i64,
    pub total_converted: i64,
    pub answer_rate: f64,
    pub avg_duration_seconds: f64,
    pub avg_duration_minutes: f64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRangeResponse {
    pub telecaller_id: i64,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub rows: Vec<DailyCallStats>,
    pub summary: StatsSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueQuery {
    pub status: Option<LeadStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueCursorQuery {
    pub index: Option<i64>,
    pub current_index: Option<i64>,
    pub status: Option<LeadStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueResponse {
    pub telecaller_id: i64,
    pub status: LeadStatus,
    pub total: usize,
    pub leads: Vec<Lead>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePosition {
    pub index: usize,
    pub total: usize,
    pub lead: Lead,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_reference_clears_and_absent_leaves_unchanged() {
        let patch: UpdateLeadRequest =
            serde_json::from_str(r#"{"assignedTelecallerId":null,"courseInterestId":7}"#).unwrap();
        assert_eq!(patch.assigned_telecaller_id, Some(None));
        assert_eq!(patch.course_interest_id, Some(Some(7)));
        assert_eq!(patch.assigned_counselor_id, None);
        assert_eq!(
            patch.provided_fields(),
            vec!["courseInterestId", "assignedTelecallerId"]
        );
    }
}

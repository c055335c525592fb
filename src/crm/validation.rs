use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use regex::Regex;
use std::sync::LazyLock;

use super::error::CrmError;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("Invalid email regex")
});

/// Phones are canonicalised by trimming only; uniqueness is exact match on
/// the trimmed value.
pub fn normalize_phone(phone: &str) -> Result<String, CrmError> {
    let trimmed = phone.trim();
    if trimmed.is_empty() {
        return Err(CrmError::Validation("Phone is required".to_string()));
    }
    Ok(trimmed.to_string())
}

pub fn validate_name(name: &str) -> Result<String, CrmError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CrmError::Validation("Name is required".to_string()));
    }
    Ok(trimmed.to_string())
}

/// Blank input is treated as absent.
pub fn validate_email(email: Option<&str>) -> Result<Option<String>, CrmError> {
    match email.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) if EMAIL_REGEX.is_match(value) => Ok(Some(value.to_string())),
        Some(value) => Err(CrmError::Validation(format!("Invalid email: {value}"))),
    }
}

pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn validate_duration(duration: Option<i64>) -> Result<Option<i32>, CrmError> {
    match duration {
        None => Ok(None),
        Some(seconds) if seconds < 0 => Err(CrmError::Validation(format!(
            "durationSeconds must be non-negative, got {seconds}"
        ))),
        Some(seconds) => i32::try_from(seconds).map(Some).map_err(|_| {
            CrmError::Validation(format!("durationSeconds out of range: {seconds}"))
        }),
    }
}

/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS[.fff]` (local to `offset`),
/// or a bare `YYYY-MM-DD` (midnight local to `offset`).
pub fn parse_timestamp(
    field: &str,
    value: &str,
    offset: FixedOffset,
) -> Result<DateTime<Utc>, CrmError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN))
        })
        .map_err(|_| CrmError::Validation(format!("{field} is not a valid timestamp: {value}")))?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| CrmError::Validation(format!("{field} is not a valid timestamp: {value}")))
}

pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, CrmError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        CrmError::Validation(format!("{field} must be a YYYY-MM-DD date, got {value}"))
    })
}

/// Calendar day of `at` in the reference time zone; this is the stats row key.
pub fn stat_date_for(at: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    at.with_timezone(&offset).date_naive()
}

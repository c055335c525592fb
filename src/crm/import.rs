use chrono::Utc;
use diesel::PgConnection;
use log::info;

use super::error::CrmError;
use super::registry::create_lead_with;
use super::types::{CreateLeadRequest, ImportResult, ImportRowError, LeadSource};

/// Admits each row on its own; a bad row is reported and the rest carry on.
pub fn import_leads(conn: &mut PgConnection, rows: Vec<CreateLeadRequest>) -> ImportResult {
    let mut result = ImportResult::default();
    for (i, row) in rows.into_iter().enumerate() {
        match create_lead_with(conn, row, LeadSource::Import, Utc::now()) {
            Ok(lead) => {
                result.imported_count += 1;
                result.lead_ids.push(lead.id);
            }
            Err(e) => record_failure(&mut result, i + 1, e),
        }
    }
    info!(
        "Lead import: {} imported, {} duplicates, {} errors",
        result.imported_count, result.duplicate_count, result.error_count
    );
    result
}

fn record_failure(result: &mut ImportResult, row: usize, error: CrmError) {
    let duplicate_of = match &error {
        CrmError::DuplicatePhone { existing } => {
            result.duplicate_count += 1;
            Some(existing.id)
        }
        _ => {
            result.error_count += 1;
            None
        }
    };
    result.errors.push(ImportRowError {
        row,
        message: error.to_string(),
        duplicate_of,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::types::{LeadStage, LeadStatus, LeadSummary};

    #[test]
    fn test_failures_are_split_into_duplicates_and_errors() {
        let mut result = ImportResult::default();
        record_failure(
            &mut result,
            2,
            CrmError::DuplicatePhone {
                existing: LeadSummary {
                    id: 11,
                    name: "Kiran".into(),
                    lead_stage: LeadStage::Contacted,
                    lead_status: LeadStatus::Active,
                    assigned_telecaller_id: None,
                    created_at: Utc::now(),
                },
            },
        );
        record_failure(&mut result, 5, CrmError::Validation("Name is required".into()));

        assert_eq!(result.duplicate_count, 1);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.errors[0].row, 2);
        assert_eq!(result.errors[0].duplicate_of, Some(11));
        assert_eq!(result.errors[1].row, 5);
        assert_eq!(result.errors[1].duplicate_of, None);
    }
}

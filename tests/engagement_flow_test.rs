#[cfg(test)]
mod engagement_flow_tests {
    use diesel::prelude::*;
    use leadserver::core::config::{DatabaseConfig, EngagementConfig};
    use chrono::{NaiveDate, TimeZone, Utc};
    use leadserver::core::shared::schema::{call_logs, users};
    use leadserver::core::shared::utils::{create_conn, run_migrations, DbPool};
    use leadserver::crm::types::{
        CallOutcome, CreateLeadRequest, LeadStage, RecordCallRequest, SetStageRequest,
        UpdateLeadRequest, UserRole,
    };
    use leadserver::crm::{CallEventProcessor, CrmError, LeadRegistry, StatsAggregator, WorkQueue};
    use std::thread;

    // Requires TEST_DATABASE_URL pointing at a disposable PostgreSQL database.
    fn test_pool() -> Option<DbPool> {
        test_pool_sized(2)
    }

    fn test_pool_sized(pool_size: u32) -> Option<DbPool> {
        let url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                println!("Skipping test - TEST_DATABASE_URL not set");
                return None;
            }
        };
        let config = DatabaseConfig {
            url,
            pool_size,
            ..DatabaseConfig::default()
        };
        let pool = match create_conn(&config) {
            Ok(pool) => pool,
            Err(_) => {
                println!("Skipping test - Cannot connect to PostgreSQL");
                return None;
            }
        };
        if let Err(e) = run_migrations(&pool) {
            println!("Skipping test - migrations failed: {e}");
            return None;
        }
        Some(pool)
    }

    fn unique_phone() -> String {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("9{:09}", nanos % 1_000_000_000)
    }

    fn insert_user(pool: &DbPool, role: &str) -> i64 {
        let mut conn = pool.get().unwrap();
        diesel::insert_into(users::table)
            .values((users::name.eq(format!("test {role}")), users::role.eq(role)))
            .returning(users::id)
            .get_result(&mut conn)
            .unwrap()
    }

    fn call(lead_id: i64, caller_id: i64, outcome: CallOutcome, stage: Option<LeadStage>) -> RecordCallRequest {
        RecordCallRequest {
            lead_id,
            caller_id,
            call_date: "2026-03-02T11:00:00+05:30".to_string(),
            outcome,
            duration_seconds: Some(120),
            next_followup_date: None,
            notes: None,
            new_lead_stage: stage,
        }
    }

    #[test]
    fn test_duplicate_then_conversion_then_no_answer() {
        let Some(pool) = test_pool() else { return };
        let engagement = EngagementConfig::default();
        let registry = LeadRegistry::new(pool.clone(), engagement.clone());
        let processor = CallEventProcessor::new(pool.clone(), engagement.clone());
        let stats = StatsAggregator::new(pool.clone());
        let telecaller = insert_user(&pool, "telecaller");
        let phone = unique_phone();

        let first = registry
            .create_lead(CreateLeadRequest {
                name: "Asha".into(),
                phone: phone.clone(),
                assigned_telecaller_id: Some(telecaller),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(first.lead_stage, LeadStage::New);

        let dup = registry
            .create_lead(CreateLeadRequest {
                name: "Asha again".into(),
                phone: format!(" {phone} "),
                ..Default::default()
            })
            .unwrap_err();
        match dup {
            CrmError::DuplicatePhone { existing } => assert_eq!(existing.id, first.id),
            other => panic!("expected duplicate, got {other:?}"),
        }

        let converted = processor
            .record_call(
                call(first.id, telecaller, CallOutcome::Converted, Some(LeadStage::Qualified)),
                UserRole::Telecaller,
            )
            .unwrap();
        assert_eq!(converted.lead.lead_stage, LeadStage::Converted);
        assert!(converted.lead.conversion_date.is_some());
        assert_eq!(converted.stats.calls_made, 1);
        assert_eq!(converted.stats.calls_answered, 1);
        assert_eq!(converted.stats.leads_converted, 1);
        assert!(converted.call_log.effects_applied_at.is_some());

        let second = processor
            .record_call(call(first.id, telecaller, CallOutcome::NoAnswer, None), UserRole::Telecaller)
            .unwrap();
        assert_eq!(second.stats.calls_made, 2);
        assert_eq!(second.stats.calls_answered, 1);
        assert_eq!(second.stats.leads_converted, 1);
        assert_eq!(second.stats.leads_contacted, 2);

        let daily = stats.get_daily_stats(telecaller, "2026-03-02").unwrap();
        assert_eq!(daily.calls_made, 2);

        // Re-applying an already counted call leaves the counters alone.
        let again = processor.reconcile_call(second.call_log.id).unwrap();
        assert_eq!(again.stats.calls_made, 2);

        let range = stats.get_stats(telecaller, "2026-03-01", "2026-03-31").unwrap();
        assert_eq!(range.summary.total_calls, 2);
        assert!((range.summary.answer_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_phone_update_respects_uniqueness_and_roles() {
        let Some(pool) = test_pool() else { return };
        let registry = LeadRegistry::new(pool.clone(), EngagementConfig::default());
        let a = registry
            .create_lead(CreateLeadRequest {
                name: "A".into(),
                phone: unique_phone(),
                ..Default::default()
            })
            .unwrap();
        let b = registry
            .create_lead(CreateLeadRequest {
                name: "B".into(),
                phone: unique_phone(),
                ..Default::default()
            })
            .unwrap();

        let restricted = registry
            .update_lead(
                b.id,
                UpdateLeadRequest {
                    phone: Some(a.phone.clone()),
                    ..Default::default()
                },
                UserRole::Telecaller,
            )
            .unwrap_err();
        assert!(matches!(restricted, CrmError::FieldRestricted { .. }));

        let dup = registry
            .update_lead(
                b.id,
                UpdateLeadRequest {
                    phone: Some(a.phone.clone()),
                    ..Default::default()
                },
                UserRole::Manager,
            )
            .unwrap_err();
        assert!(matches!(dup, CrmError::DuplicatePhone { existing } if existing.id == a.id));

        // Re-submitting a lead's own phone is not a conflict.
        let same = registry
            .update_lead(
                a.id,
                UpdateLeadRequest {
                    phone: Some(a.phone.clone()),
                    notes: Some("called back".into()),
                    ..Default::default()
                },
                UserRole::Counselor,
            )
            .unwrap();
        assert_eq!(same.notes.as_deref(), Some("called back"));

        let lost = registry
            .set_stage(
                a.id,
                SetStageRequest {
                    lead_stage: LeadStage::Lost,
                    lost_reason: Some("enrolled elsewhere".into()),
                },
                UserRole::Telecaller,
            )
            .unwrap();
        assert_eq!(lost.lead_stage, LeadStage::Lost);
        assert!(registry
            .set_stage(
                a.id,
                SetStageRequest {
                    lead_stage: LeadStage::Contacted,
                    lost_reason: None,
                },
                UserRole::Manager,
            )
            .is_err());

        assert!(matches!(
            registry.delete_lead(b.id, UserRole::Manager),
            Err(CrmError::Forbidden(_))
        ));
        registry.delete_lead(b.id, UserRole::Admin).unwrap();
        assert!(matches!(registry.get_lead(b.id), Err(CrmError::LeadNotFound(_))));
    }

    #[test]
    fn test_queue_for_telecaller() {
        let Some(pool) = test_pool() else { return };
        let registry = LeadRegistry::new(pool.clone(), EngagementConfig::default());
        let queue = WorkQueue::new(pool.clone());
        let telecaller = insert_user(&pool, "telecaller");

        assert!(matches!(
            queue.advance_to_next(telecaller, 0, None),
            Err(CrmError::EmptyQueue { .. })
        ));

        let engaged = registry
            .create_lead(CreateLeadRequest {
                name: "Engaged".into(),
                phone: unique_phone(),
                lead_stage: Some(LeadStage::Negotiation),
                assigned_telecaller_id: Some(telecaller),
                ..Default::default()
            })
            .unwrap();
        let fresh = registry
            .create_lead(CreateLeadRequest {
                name: "Fresh".into(),
                phone: unique_phone(),
                assigned_telecaller_id: Some(telecaller),
                ..Default::default()
            })
            .unwrap();

        let ordered = queue.ordered_queue(telecaller, None).unwrap();
        let ids: Vec<i64> = ordered.leads.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![fresh.id, engaged.id]);

        let next = queue.advance_to_next(telecaller, 1, None).unwrap();
        assert_eq!(next.index, 0);
        assert_eq!(next.lead.id, fresh.id);
    }

    #[test]
    fn test_concurrent_calls_count_every_call_once() {
        let Some(pool) = test_pool_sized(6) else { return };
        let registry = LeadRegistry::new(pool.clone(), EngagementConfig::default());
        let processor = CallEventProcessor::new(pool.clone(), EngagementConfig::default());
        let stats = StatsAggregator::new(pool.clone());
        let telecaller = insert_user(&pool, "telecaller");
        let lead_ids: Vec<i64> = (0..3)
            .map(|i| {
                registry
                    .create_lead(CreateLeadRequest {
                        name: format!("Parallel {i}"),
                        phone: unique_phone(),
                        assigned_telecaller_id: Some(telecaller),
                        ..Default::default()
                    })
                    .unwrap()
                    .id
            })
            .collect();

        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..12)
                .map(|i| {
                    let processor = processor.clone();
                    let lead_id = lead_ids[i % lead_ids.len()];
                    let outcome = if i % 2 == 0 {
                        CallOutcome::Answered
                    } else {
                        CallOutcome::NoAnswer
                    };
                    scope.spawn(move || {
                        processor.record_call(call(lead_id, telecaller, outcome, None), UserRole::Telecaller)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for result in &results {
            assert!(result.is_ok(), "call failed: {result:?}");
        }

        let daily = stats.get_daily_stats(telecaller, "2026-03-02").unwrap();
        assert_eq!(daily.calls_made, 12);
        assert_eq!(daily.calls_answered, 6);
    }

    #[test]
    fn test_concurrent_creates_admit_one_phone() {
        let Some(pool) = test_pool_sized(6) else { return };
        let registry = LeadRegistry::new(pool.clone(), EngagementConfig::default());
        let phone = unique_phone();

        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..10)
                .map(|i| {
                    let registry = registry.clone();
                    let phone = if i % 2 == 0 {
                        phone.clone()
                    } else {
                        format!("  {phone}\t")
                    };
                    scope.spawn(move || {
                        registry.create_lead(CreateLeadRequest {
                            name: format!("Racer {i}"),
                            phone,
                            ..Default::default()
                        })
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let created: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].phone, phone);
        let winner = created[0].id;
        for result in &results {
            match result {
                Ok(_) => {}
                Err(CrmError::DuplicatePhone { existing }) => assert_eq!(existing.id, winner),
                Err(other) => panic!("expected duplicate, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_import_checks_each_row_for_duplicates() {
        let Some(pool) = test_pool() else { return };
        let registry = LeadRegistry::new(pool.clone(), EngagementConfig::default());
        let existing = registry
            .create_lead(CreateLeadRequest {
                name: "Existing".into(),
                phone: unique_phone(),
                ..Default::default()
            })
            .unwrap();

        let result = registry
            .import_leads(vec![
                CreateLeadRequest {
                    name: "Imported".into(),
                    phone: unique_phone(),
                    ..Default::default()
                },
                CreateLeadRequest {
                    name: "Repeat".into(),
                    phone: format!(" {} ", existing.phone),
                    ..Default::default()
                },
                CreateLeadRequest {
                    name: "   ".into(),
                    phone: unique_phone(),
                    ..Default::default()
                },
            ])
            .unwrap();

        assert_eq!(
            (result.imported_count, result.duplicate_count, result.error_count),
            (1, 1, 1)
        );
        let imported = registry.get_lead(result.lead_ids[0]).unwrap();
        assert_eq!(imported.name, "Imported");
        let duplicate = result.errors.iter().find(|e| e.row == 2).unwrap();
        assert_eq!(duplicate.duplicate_of, Some(existing.id));
        let invalid = result.errors.iter().find(|e| e.row == 3).unwrap();
        assert_eq!(invalid.duplicate_of, None);
    }

    #[test]
    fn test_pending_call_log_is_reconciled_once() {
        let Some(pool) = test_pool() else { return };
        let registry = LeadRegistry::new(pool.clone(), EngagementConfig::default());
        let processor = CallEventProcessor::new(pool.clone(), EngagementConfig::default());
        let stats = StatsAggregator::new(pool.clone());
        let telecaller = insert_user(&pool, "telecaller");
        let lead = registry
            .create_lead(CreateLeadRequest {
                name: "Pending".into(),
                phone: unique_phone(),
                assigned_telecaller_id: Some(telecaller),
                ..Default::default()
            })
            .unwrap();

        let stat_date = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        let call_log_id: i64 = {
            let mut conn = pool.get().unwrap();
            diesel::insert_into(call_logs::table)
                .values((
                    call_logs::lead_id.eq(lead.id),
                    call_logs::caller_id.eq(telecaller),
                    call_logs::call_date.eq(Utc.with_ymd_and_hms(2026, 3, 3, 6, 0, 0).unwrap()),
                    call_logs::stat_date.eq(stat_date),
                    call_logs::outcome.eq("answered"),
                    call_logs::requested_by_role.eq("telecaller"),
                ))
                .returning(call_logs::id)
                .get_result(&mut conn)
                .unwrap()
        };
        assert!(matches!(
            stats.get_daily_stats(telecaller, "2026-03-03"),
            Err(CrmError::NotFound(_))
        ));

        let report = processor.reconcile_pending(None).unwrap();
        assert!(report.applied.contains(&call_log_id));

        let daily = stats.get_daily_stats(telecaller, "2026-03-03").unwrap();
        assert_eq!(daily.calls_made, 1);
        assert_eq!(daily.calls_answered, 1);
        assert_eq!(registry.get_lead(lead.id).unwrap().lead_stage, LeadStage::New);

        let again = processor.reconcile_call(call_log_id).unwrap();
        assert_eq!(again.stats.calls_made, 1);
        assert!(again.call_log.effects_applied_at.is_some());
        let report = processor.reconcile_pending(None).unwrap();
        assert!(!report.applied.contains(&call_log_id));
        assert_eq!(
            stats.get_daily_stats(telecaller, "2026-03-03").unwrap().calls_made,
            1
        );
    }

    #[test]
    fn test_daily_call_limit_is_enforced() {
        let Some(pool) = test_pool() else { return };
        let engagement = EngagementConfig {
            daily_call_limit: Some(2),
            ..EngagementConfig::default()
        };
        let registry = LeadRegistry::new(pool.clone(), engagement.clone());
        let processor = CallEventProcessor::new(pool.clone(), engagement);
        let telecaller = insert_user(&pool, "telecaller");
        let lead = registry
            .create_lead(CreateLeadRequest {
                name: "Limited".into(),
                phone: unique_phone(),
                assigned_telecaller_id: Some(telecaller),
                ..Default::default()
            })
            .unwrap();

        for _ in 0..2 {
            processor
                .record_call(call(lead.id, telecaller, CallOutcome::Busy, None), UserRole::Telecaller)
                .unwrap();
        }
        let err = processor
            .record_call(call(lead.id, telecaller, CallOutcome::Busy, None), UserRole::Telecaller)
            .unwrap_err();
        assert!(matches!(err, CrmError::CallLimitReached { limit: 2, .. }));
        assert_eq!(err.status(), axum::http::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(processor.list_call_logs(lead.id).unwrap().len(), 2);
    }

    #[test]
    fn test_patch_to_converted_stamps_date_and_unassigns() {
        let Some(pool) = test_pool() else { return };
        let registry = LeadRegistry::new(pool.clone(), EngagementConfig::default());
        let telecaller = insert_user(&pool, "telecaller");
        let lead = registry
            .create_lead(CreateLeadRequest {
                name: "Closer".into(),
                phone: unique_phone(),
                assigned_telecaller_id: Some(telecaller),
                ..Default::default()
            })
            .unwrap();
        assert!(lead.conversion_date.is_none());

        let converted = registry
            .update_lead(
                lead.id,
                UpdateLeadRequest {
                    lead_stage: Some(LeadStage::Converted),
                    ..Default::default()
                },
                UserRole::Manager,
            )
            .unwrap();
        assert_eq!(converted.lead_stage, LeadStage::Converted);
        assert!(converted.conversion_date.is_some());

        let unassigned = registry
            .update_lead(
                lead.id,
                UpdateLeadRequest {
                    assigned_telecaller_id: Some(None),
                    ..Default::default()
                },
                UserRole::Manager,
            )
            .unwrap();
        assert_eq!(unassigned.assigned_telecaller_id, None);
        assert_eq!(unassigned.conversion_date, converted.conversion_date);
    }
}

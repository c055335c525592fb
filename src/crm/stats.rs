use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use log::debug;

use crate::core::shared::schema::daily_call_stats;
use crate::core::shared::utils::DbPool;

use super::error::CrmError;
use super::storage::{db_stats_to_stats, DbDailyStats, NewDbDailyStats};
use super::types::{CallOutcome, DailyCallStats, StatsRangeResponse, StatsSummary};
use super::validation::parse_date;

/// Per-event increments applied to a (telecaller, day) row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsDelta {
    pub calls_made: i32,
    pub calls_answered: i32,
    pub total_duration_seconds: i64,
    pub leads_contacted: i32,
    pub leads_converted: i32,
}

impl StatsDelta {
    pub fn for_call(outcome: CallOutcome, duration_seconds: Option<i32>) -> Self {
        Self {
            calls_made: 1,
            calls_answered: i32::from(outcome.is_answered()),
            total_duration_seconds: i64::from(duration_seconds.unwrap_or(0)),
            leads_contacted: 1,
            leads_converted: i32::from(outcome.is_conversion()),
        }
    }
}

/// Adds `delta` to the row for (telecaller, day), creating it on first use.
/// A single statement, so concurrent calls for the same day cannot lose an
/// increment.
pub fn upsert_daily_stats(
    conn: &mut PgConnection,
    telecaller_id: i64,
    stat_date: NaiveDate,
    delta: StatsDelta,
    now: DateTime<Utc>,
) -> Result<DailyCallStats, CrmError> {
    let row = NewDbDailyStats {
        telecaller_id,
        stat_date,
        calls_made: delta.calls_made,
        calls_answered: delta.calls_answered,
        total_duration_seconds: delta.total_duration_seconds,
        leads_contacted: delta.leads_contacted,
        leads_converted: delta.leads_converted,
        created_at: now,
        updated_at: now,
    };

    let stored: DbDailyStats = diesel::insert_into(daily_call_stats::table)
        .values(&row)
        .on_conflict((daily_call_stats::telecaller_id, daily_call_stats::stat_date))
        .do_update()
        .set((
            daily_call_stats::calls_made
                .eq(daily_call_stats::calls_made + excluded(daily_call_stats::calls_made)),
            daily_call_stats::calls_answered
                .eq(daily_call_stats::calls_answered + excluded(daily_call_stats::calls_answered)),
            daily_call_stats::total_duration_seconds.eq(daily_call_stats::total_duration_seconds
                + excluded(daily_call_stats::total_duration_seconds)),
            daily_call_stats::leads_contacted
                .eq(daily_call_stats::leads_contacted + excluded(daily_call_stats::leads_contacted)),
            daily_call_stats::leads_converted
                .eq(daily_call_stats::leads_converted + excluded(daily_call_stats::leads_converted)),
            daily_call_stats::updated_at.eq(now),
        ))
        .returning(DbDailyStats::as_returning())
        .get_result(conn)?;

    debug!(
        "Stats for telecaller {telecaller_id} on {stat_date}: made={} answered={} converted={}",
        stored.calls_made, stored.calls_answered, stored.leads_converted
    );
    Ok(db_stats_to_stats(stored))
}

pub fn find_daily_stats(
    conn: &mut PgConnection,
    telecaller_id: i64,
    stat_date: NaiveDate,
) -> Result<Option<DailyCallStats>, CrmError> {
    let row: Option<DbDailyStats> = daily_call_stats::table
        .filter(daily_call_stats::telecaller_id.eq(telecaller_id))
        .filter(daily_call_stats::stat_date.eq(stat_date))
        .select(DbDailyStats::as_select())
        .first(conn)
        .optional()?;
    Ok(row.map(db_stats_to_stats))
}

fn ratio(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Derived aggregates over a set of daily rows; never stored.
pub fn summarize(rows: &[DailyCallStats]) -> StatsSummary {
    let mut summary = StatsSummary::default();
    for row in rows {
        summary.total_calls += i64::from(row.calls_made);
        summary.total_answered += i64::from(row.calls_answered);
        summary.total_duration += row.total_duration_seconds;
        summary.total_contacted += i64::from(row.leads_contacted);
        summary.total_converted += i64::from(row.leads_converted);
    }
    summary.answer_rate = ratio(summary.total_answered, summary.total_calls);
    summary.avg_duration_seconds = ratio(summary.total_duration, summary.total_answered);
    summary.avg_duration_minutes = summary.avg_duration_seconds / 60.0;
    summary.conversion_rate = ratio(summary.total_converted, summary.total_contacted);
    summary
}

/// Read side of the per-telecaller daily rollup.
#[derive(Clone)]
pub struct StatsAggregator {
    pool: DbPool,
}

impl StatsAggregator {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn get_daily_stats(&self, telecaller_id: i64, date: &str) -> Result<DailyCallStats, CrmError> {
        let stat_date = parse_date("date", date)?;
        let mut conn = self.pool.get()?;
        find_daily_stats(&mut conn, telecaller_id, stat_date)?.ok_or_else(|| {
            CrmError::NotFound(format!("No stats for telecaller {telecaller_id} on {stat_date}"))
        })
    }

    pub fn get_stats(
        &self,
        telecaller_id: i64,
        from: &str,
        to: &str,
    ) -> Result<StatsRangeResponse, CrmError> {
        let from = parse_date("from", from)?;
        let to = parse_date("to", to)?;
        if from > to {
            return Err(CrmError::Validation(format!("from ({from}) is after to ({to})")));
        }

        let mut conn = self.pool.get()?;
        let rows: Vec<DbDailyStats> = daily_call_stats::table
            .filter(daily_call_stats::telecaller_id.eq(telecaller_id))
            .filter(daily_call_stats::stat_date.between(from, to))
            .order(daily_call_stats::stat_date.asc())
            .select(DbDailyStats::as_select())
            .load(&mut conn)?;
        let rows: Vec<DailyCallStats> = rows.into_iter().map(db_stats_to_stats).collect();

        Ok(StatsRangeResponse {
            telecaller_id,
            from,
            to,
            summary: summarize(&rows),
            rows,
        })
    }

    pub fn team_stats(&self, date: &str) -> Result<Vec<DailyCallStats>, CrmError> {
        let stat_date = parse_date("date", date)?;
        let mut conn = self.pool.get()?;
        let rows: Vec<DbDailyStats> = daily_call_stats::table
            .filter(daily_call_stats::stat_date.eq(stat_date))
            .order(daily_call_stats::calls_made.desc())
            .then_order_by(daily_call_stats::telecaller_id.asc())
            .select(DbDailyStats::as_select())
            .load(&mut conn)?;
        Ok(rows.into_iter().map(db_stats_to_stats).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(made: i32, answered: i32, duration: i64, converted: i32) -> DailyCallStats {
        let now = Utc::now();
        DailyCallStats {
            id: 0,
            telecaller_id: 5,
            stat_date: now.date_naive(),
            calls_made: made,
            calls_answered: answered,
            total_duration_seconds: duration,
            leads_contacted: made,
            leads_converted: converted,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_delta_classification() {
        let answered = [
            CallOutcome::Answered,
            CallOutcome::Interested,
            CallOutcome::Converted,
        ];
        let unanswered = [
            CallOutcome::NoAnswer,
            CallOutcome::Busy,
            CallOutcome::CallbackRequested,
            CallOutcome::NotInterested,
        ];
        for outcome in answered {
            assert_eq!(StatsDelta::for_call(outcome, None).calls_answered, 1);
        }
        for outcome in unanswered {
            let delta = StatsDelta::for_call(outcome, Some(10));
            assert_eq!(delta.calls_answered, 0);
            assert_eq!(delta.calls_made, 1);
            assert_eq!(delta.leads_contacted, 1);
            assert_eq!(delta.leads_converted, 0);
        }
        assert_eq!(
            StatsDelta::for_call(CallOutcome::Converted, Some(300)),
            StatsDelta {
                calls_made: 1,
                calls_answered: 1,
                total_duration_seconds: 300,
                leads_contacted: 1,
                leads_converted: 1,
            }
        );
    }

    #[test]
    fn test_summary_ratios_are_zero_without_denominators() {
        let summary = summarize(&[]);
        assert_eq!(summary.answer_rate, 0.0);
        assert_eq!(summary.conversion_rate, 0.0);
        assert_eq!(summary.avg_duration_minutes, 0.0);

        let no_answers = summarize(&[row(4, 0, 0, 0)]);
        assert_eq!(no_answers.answer_rate, 0.0);
        assert_eq!(no_answers.avg_duration_seconds, 0.0);
        assert!(!no_answers.avg_duration_minutes.is_nan());
    }

    #[test]
    fn test_summary_over_several_days() {
        let summary = summarize(&[row(10, 4, 600, 1), row(6, 2, 120, 0)]);
        assert_eq!(summary.total_calls, 16);
        assert_eq!(summary.total_answered, 6);
        assert_eq!(summary.total_duration, 720);
        assert_eq!(summary.total_contacted, 16);
        assert_eq!(summary.total_converted, 1);
        assert!((summary.answer_rate - 0.375).abs() < f64::EPSILON);
        assert!((summary.avg_duration_seconds - 120.0).abs() < f64::EPSILON);
        assert!((summary.avg_duration_minutes - 2.0).abs() < f64::EPSILON);
        assert!((summary.conversion_rate - 1.0 / 16.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_deltas_sum_independently_of_order() {
        let outcomes = [
            CallOutcome::Converted,
            CallOutcome::NoAnswer,
            CallOutcome::Interested,
            CallOutcome::Busy,
        ];
        let fold = |seq: &[CallOutcome]| {
            seq.iter().fold((0, 0), |(made, answered), outcome| {
                let d = StatsDelta::for_call(*outcome, None);
                (made + d.calls_made, answered + d.calls_answered)
            })
        };
        let mut reversed = outcomes;
        reversed.reverse();
        assert_eq!(fold(&outcomes), (4, 2));
        assert_eq!(fold(&outcomes), fold(&reversed));
    }
}

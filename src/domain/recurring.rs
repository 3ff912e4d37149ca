use crate::domain::models::{AssignmentStatus, CheckInAssignment};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashSet;

pub const DAYS_PER_WEEK: i64 = 7;
/// Days after the last due date during which the final week is still current.
pub const SERIES_GRACE_DAYS: i64 = 7;

/// Week index of a document: the stored week when valid, otherwise the
/// offset of its due date from the series' week-1 due date.
pub fn resolve_week(
    stored: Option<i32>,
    due_date: DateTime<Utc>,
    week1_due: Option<DateTime<Utc>>,
) -> i32 {
    if let Some(week) = stored.filter(|w| *w >= 1) {
        return week;
    }
    let Some(week1_due) = week1_due else {
        return 1;
    };
    let days = (due_date.date_naive() - week1_due.date_naive()).num_days();
    (days.div_euclid(DAYS_PER_WEEK) + 1).max(1) as i32
}

/// Due date of week 1 for a series: the document stored as week 1, else the
/// earliest due date.
pub fn week1_due_date(series: &[CheckInAssignment]) -> Option<DateTime<Utc>> {
    series
        .iter()
        .filter(|a| a.recurring_week == Some(1))
        .map(|a| a.due_date)
        .min()
        .or_else(|| series.iter().map(|a| a.due_date).min())
}

pub fn due_date_for_week(week1_due: DateTime<Utc>, week: i32) -> DateTime<Utc> {
    week1_due + Duration::days(DAYS_PER_WEEK * (week.max(1) as i64 - 1))
}

/// Resolved week for every document of one series, in input order.
pub fn resolved_weeks(series: &[CheckInAssignment]) -> Vec<i32> {
    let week1 = week1_due_date(series);
    series
        .iter()
        .map(|a| resolve_week(a.recurring_week, a.due_date, week1))
        .collect()
}

/// The week a client should be completing on `today`.
///
/// Week 1 is current up to and including its due date; week k+1 becomes
/// current the day after week k is due. Returns `None` once the series has
/// finished and its grace period is over.
pub fn current_week(week1_due: NaiveDate, today: NaiveDate, total_weeks: i32) -> Option<i32> {
    let total_weeks = total_weeks.max(1);
    let days = (today - week1_due).num_days();
    if days <= 0 {
        return Some(1);
    }
    let week = ((days - 1) / DAYS_PER_WEEK + 2) as i32;
    if week <= total_weeks {
        return Some(week);
    }
    let past_last_due = days - DAYS_PER_WEEK * (total_weeks as i64 - 1);
    if past_last_due <= SERIES_GRACE_DAYS {
        Some(total_weeks)
    } else {
        None
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SeriesSchedule {
    pub current_week: Option<i32>,
    pub total_weeks: i32,
    pub next_due_date: Option<NaiveDate>,
    pub days_until: Option<i64>,
    pub finished: bool,
}

pub fn schedule_for(week1_due: NaiveDate, today: NaiveDate, total_weeks: i32) -> SeriesSchedule {
    let current = current_week(week1_due, today, total_weeks);
    let next_due_date =
        current.map(|week| week1_due + Duration::days(DAYS_PER_WEEK * (week as i64 - 1)));
    SeriesSchedule {
        current_week: current,
        total_weeks: total_weeks.max(1),
        next_due_date,
        days_until: next_due_date.map(|d| (d - today).num_days()),
        finished: current.is_none(),
    }
}

/// Pending assignments become overdue once `now` passes due + grace.
pub fn derive_status(
    status: AssignmentStatus,
    due_date: DateTime<Utc>,
    now: DateTime<Utc>,
    grace: Duration,
) -> AssignmentStatus {
    match status {
        AssignmentStatus::Completed => AssignmentStatus::Completed,
        AssignmentStatus::Pending | AssignmentStatus::Overdue => {
            if now > due_date + grace {
                AssignmentStatus::Overdue
            } else {
                AssignmentStatus::Pending
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MissingWeek {
    pub week: i32,
    pub due_date: DateTime<Utc>,
    pub status: AssignmentStatus,
}

/// Weeks `1..=through_week` that have no document yet.
pub fn plan_backfill(
    week1_due: DateTime<Utc>,
    existing_weeks: &HashSet<i32>,
    through_week: i32,
    now: DateTime<Utc>,
    grace: Duration,
) -> Vec<MissingWeek> {
    (1..=through_week)
        .filter(|week| !existing_weeks.contains(week))
        .map(|week| {
            let due_date = due_date_for_week(week1_due, week);
            MissingWeek {
                week,
                due_date,
                status: derive_status(AssignmentStatus::Pending, due_date, now, grace),
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 17, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn assignment(
        series_id: Uuid,
        week: Option<i32>,
        due_date: DateTime<Utc>,
    ) -> CheckInAssignment {
        CheckInAssignment {
            id: Uuid::new_v4(),
            series_id,
            client_id: Uuid::nil(),
            coach_id: Uuid::nil(),
            form_id: Uuid::nil(),
            recurring_week: week,
            total_weeks: 12,
            due_date,
            status: AssignmentStatus::Pending,
            response_id: None,
            score: None,
            completed_at: None,
            reminder_sent_at: None,
            overdue_notice_sent_at: None,
            created_at: due_date - Duration::days(7),
            updated_at: due_date - Duration::days(7),
        }
    }

    #[test]
    fn stored_week_wins_over_due_date() {
        assert_eq!(resolve_week(Some(4), at(2026, 1, 5), Some(at(2026, 1, 5))), 4);
    }

    #[test]
    fn week_derived_from_due_date_offset() {
        let week1 = Some(at(2026, 1, 5));
        assert_eq!(resolve_week(None, at(2026, 1, 5), week1), 1);
        assert_eq!(resolve_week(None, at(2026, 1, 11), week1), 1);
        assert_eq!(resolve_week(None, at(2026, 1, 12), week1), 2);
        assert_eq!(resolve_week(Some(0), at(2026, 2, 2), week1), 5);
        // Due before week 1 never yields week 0.
        assert_eq!(resolve_week(None, at(2025, 12, 20), week1), 1);
        assert_eq!(resolve_week(None, at(2026, 3, 1), None), 1);
    }

    #[test]
    fn week1_prefers_stored_marker() {
        let series = Uuid::new_v4();
        let docs = vec![
            assignment(series, None, at(2026, 1, 1)),
            assignment(series, Some(1), at(2026, 1, 5)),
            assignment(series, Some(2), at(2026, 1, 12)),
        ];
        assert_eq!(week1_due_date(&docs), Some(at(2026, 1, 5)));
        assert_eq!(resolved_weeks(&docs), vec![1, 1, 2]);

        let unmarked = vec![
            assignment(series, None, at(2026, 1, 19)),
            assignment(series, None, at(2026, 1, 5)),
        ];
        assert_eq!(week1_due_date(&unmarked), Some(at(2026, 1, 5)));
        assert_eq!(resolved_weeks(&unmarked), vec![3, 1]);
    }

    #[test]
    fn current_week_advances_day_after_due() {
        let week1 = date(2026, 1, 5);
        assert_eq!(current_week(week1, date(2025, 12, 30), 4), Some(1));
        assert_eq!(current_week(week1, date(2026, 1, 5), 4), Some(1));
        assert_eq!(current_week(week1, date(2026, 1, 6), 4), Some(2));
        assert_eq!(current_week(week1, date(2026, 1, 12), 4), Some(2));
        assert_eq!(current_week(week1, date(2026, 1, 13), 4), Some(3));
    }

    #[test]
    fn current_week_ends_after_grace() {
        let week1 = date(2026, 1, 5);
        // week 4 due 2026-01-26
        assert_eq!(current_week(week1, date(2026, 1, 26), 4), Some(4));
        assert_eq!(current_week(week1, date(2026, 2, 2), 4), Some(4));
        assert_eq!(current_week(week1, date(2026, 2, 3), 4), None);
    }

    #[test]
    fn schedule_reports_next_due() {
        let s = schedule_for(date(2026, 1, 5), date(2026, 1, 8), 6);
        assert_eq!(s.current_week, Some(2));
        assert_eq!(s.next_due_date, Some(date(2026, 1, 12)));
        assert_eq!(s.days_until, Some(4));
        assert!(!s.finished);
    }

    #[test]
    fn overdue_after_grace_and_completed_is_sticky() {
        let due = at(2026, 1, 5);
        let grace = Duration::hours(12);
        assert_eq!(
            derive_status(AssignmentStatus::Pending, due, due + Duration::hours(6), grace),
            AssignmentStatus::Pending
        );
        assert_eq!(
            derive_status(AssignmentStatus::Pending, due, due + Duration::hours(13), grace),
            AssignmentStatus::Overdue
        );
        assert_eq!(
            derive_status(AssignmentStatus::Completed, due, due + Duration::days(30), grace),
            AssignmentStatus::Completed
        );
        // A moved due date can bring an overdue assignment back to pending.
        assert_eq!(
            derive_status(AssignmentStatus::Overdue, due, due - Duration::days(1), grace),
            AssignmentStatus::Pending
        );
    }

    #[test]
    fn backfill_fills_gaps_only() {
        let week1 = at(2026, 1, 5);
        let existing: HashSet<i32> = [1, 3].into_iter().collect();
        let now = at(2026, 1, 20);

        let missing = plan_backfill(week1, &existing, 4, now, Duration::zero());
        let weeks: Vec<i32> = missing.iter().map(|m| m.week).collect();
        assert_eq!(weeks, vec![2, 4]);
        assert_eq!(missing[0].due_date, at(2026, 1, 12));
        assert_eq!(missing[0].status, AssignmentStatus::Overdue);
        assert_eq!(missing[1].due_date, at(2026, 1, 26));
        assert_eq!(missing[1].status, AssignmentStatus::Pending);
    }
}

use crate::config::AppConfig;
use crate::db::{self, assignments};
use crate::db::assignments::{NewAssignment, NewResponse};
use crate::domain::models::{Answer, AssignmentStatus, CheckInAssignment, Client, Form, FormResponse};
use crate::domain::recurring::{
    self, plan_backfill, resolve_week, schedule_for, week1_due_date, SeriesSchedule,
};
use crate::domain::scoring::{score_response, ScoreBreakdown};
use crate::domain::submission::{validate_answers, SubmissionError};
use crate::services::audit::{AuditEvent, SYSTEM_ACTOR};
use crate::services::notifications::{self, Mailer};
use crate::time_utils::ClientTimezone;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct CurrentCheckin {
    pub assignment: CheckInAssignment,
    pub week: i32,
    pub schedule: SeriesSchedule,
    /// Week documents created while resolving this check-in.
    pub backfilled: usize,
}

struct ActiveSeries<'a> {
    docs: Vec<&'a CheckInAssignment>,
    week1_due: DateTime<Utc>,
    schedule: SeriesSchedule,
}

/// Picks the most recently started series that still has a current week.
fn active_series<'a>(
    docs: &'a [CheckInAssignment],
    tz: ClientTimezone,
    now: DateTime<Utc>,
) -> Option<ActiveSeries<'a>> {
    let mut by_series: BTreeMap<Uuid, Vec<&CheckInAssignment>> = BTreeMap::new();
    for doc in docs {
        by_series.entry(doc.series_id).or_default().push(doc);
    }

    let today = tz.local_date(now);
    by_series
        .into_values()
        .filter_map(|series| {
            let owned: Vec<CheckInAssignment> = series.iter().map(|d| (*d).clone()).collect();
            let week1_due = week1_due_date(&owned)?;
            let total_weeks = series.iter().map(|d| d.total_weeks).max().unwrap_or(1);
            let schedule = schedule_for(tz.local_date(week1_due), today, total_weeks);
            schedule.current_week.map(|_| ActiveSeries {
                docs: series,
                week1_due,
                schedule,
            })
        })
        .max_by_key(|s| s.week1_due)
}

/// The series of `form_id` that is scheduled or still running, if any.
pub fn unfinished_series(
    docs: &[CheckInAssignment],
    form_id: Uuid,
    tz: ClientTimezone,
    now: DateTime<Utc>,
) -> Option<Uuid> {
    let same_form: Vec<CheckInAssignment> =
        docs.iter().filter(|d| d.form_id == form_id).cloned().collect();
    active_series(&same_form, tz, now).map(|active| active.docs[0].series_id)
}

/// Resolves the week a client should be completing now, creating any week
/// documents missing up to it, and returns that week's assignment.
pub async fn current_checkin(
    pool: &PgPool,
    config: &AppConfig,
    client: &Client,
    now: DateTime<Utc>,
) -> Result<Option<CurrentCheckin>> {
    let tz = ClientTimezone::parse_or_utc(&client.timezone);
    let docs = assignments::list_client_assignments(pool, client.id).await?;

    let Some(active) = active_series(&docs, tz, now) else {
        return Ok(None);
    };
    let Some(week) = active.schedule.current_week else {
        return Ok(None);
    };
    let template = active.docs[0];
    let series_id = template.series_id;

    let week1 = Some(active.week1_due);
    let existing: HashSet<i32> = active
        .docs
        .iter()
        .map(|d| resolve_week(d.recurring_week, d.due_date, week1))
        .collect();

    let missing = plan_backfill(active.week1_due, &existing, week, now, config.overdue_grace());
    let mut created_weeks = Vec::new();
    if !missing.is_empty() {
        let mut tx = pool.begin().await?;
        for gap in &missing {
            let created = assignments::insert_assignment(
                &mut *tx,
                &NewAssignment {
                    series_id,
                    client_id: client.id,
                    coach_id: template.coach_id,
                    form_id: template.form_id,
                    recurring_week: Some(gap.week),
                    total_weeks: active.schedule.total_weeks,
                    due_date: gap.due_date,
                    status: gap.status,
                },
            )
            .await?;
            if created.is_some() {
                created_weeks.push(gap.week);
            }
        }
        tx.commit().await?;
        if !created_weeks.is_empty() {
            tracing::info!(
                client_id = %client.id,
                series_id = %series_id,
                backfilled = created_weeks.len(),
                "Backfilled missing check-in weeks"
            );
            backfill_event(client.id, series_id, &created_weeks)
                .record(pool)
                .await;
        }
    }
    let backfilled = created_weeks.len();

    let series = assignments::list_series(pool, series_id).await?;
    let week1 = week1_due_date(&series);
    let assignment = series
        .into_iter()
        .filter(|d| resolve_week(d.recurring_week, d.due_date, week1) == week)
        .min_by_key(|d| {
            (
                d.status != AssignmentStatus::Completed,
                d.response_id.is_none(),
                d.created_at,
            )
        });

    Ok(assignment.map(|assignment| CurrentCheckin {
        assignment,
        week,
        schedule: active.schedule,
        backfilled,
    }))
}

fn backfill_event(client_id: Uuid, series_id: Uuid, weeks: &[i32]) -> AuditEvent {
    AuditEvent::new(SYSTEM_ACTOR, "assignment.backfill", "series", series_id)
        .with_details(json!({ "client_id": client_id, "weeks": weeks }))
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentView {
    #[serde(flatten)]
    pub assignment: CheckInAssignment,
    pub resolved_week: i32,
}

/// Assignments with their resolved week, ordered by due date.
pub fn with_resolved_weeks(docs: Vec<CheckInAssignment>) -> Vec<AssignmentView> {
    let mut by_series: BTreeMap<Uuid, Vec<CheckInAssignment>> = BTreeMap::new();
    for doc in docs {
        by_series.entry(doc.series_id).or_default().push(doc);
    }

    let mut views: Vec<AssignmentView> = by_series
        .into_values()
        .flat_map(|series| {
            let weeks = recurring::resolved_weeks(&series);
            series
                .into_iter()
                .zip(weeks)
                .map(|(assignment, resolved_week)| AssignmentView {
                    assignment,
                    resolved_week,
                })
                .collect::<Vec<_>>()
        })
        .collect();
    views.sort_by_key(|v| (v.assignment.due_date, v.assignment.created_at));
    views
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("assignment not found")]
    AssignmentNotFound,
    #[error(transparent)]
    Invalid(#[from] SubmissionError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for SubmitError {
    fn from(e: sqlx::Error) -> Self {
        SubmitError::Other(e.into())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub response: FormResponse,
    pub breakdown: ScoreBreakdown,
    #[serde(skip)]
    pub client: Client,
    #[serde(skip)]
    pub form: Form,
}

/// Validates and scores the answers, then stores the response and completes
/// the assignment in one transaction.
pub async fn submit(
    pool: &PgPool,
    assignment_id: Uuid,
    client_id: Uuid,
    answers: Vec<Answer>,
    now: DateTime<Utc>,
) -> Result<SubmitOutcome, SubmitError> {
    let mut tx = pool.begin().await?;

    let assignment = assignments::lock_assignment(&mut *tx, assignment_id)
        .await?
        .filter(|a| a.client_id == client_id)
        .ok_or(SubmitError::AssignmentNotFound)?;

    if assignment.status == AssignmentStatus::Completed && assignment.response_id.is_some() {
        return Err(SubmissionError::AlreadyCompleted.into());
    }

    let client = db::find_client(pool, client_id)
        .await?
        .ok_or(SubmitError::AssignmentNotFound)?;
    let form = db::find_form(pool, assignment.form_id)
        .await?
        .ok_or(SubmitError::AssignmentNotFound)?;
    let questions = db::form_questions(pool, &form).await?;

    let answers = validate_answers(&questions, answers)?;
    let breakdown = score_response(&questions, &answers, client.thresholds());

    let series = assignments::list_series(pool, assignment.series_id).await?;
    let week = resolve_week(
        assignment.recurring_week,
        assignment.due_date,
        week1_due_date(&series),
    );

    let response = assignments::insert_response(
        &mut *tx,
        &NewResponse {
            assignment_id: assignment.id,
            client_id,
            coach_id: assignment.coach_id,
            form_id: assignment.form_id,
            recurring_week: week,
            answers,
            score: breakdown.score,
            scored_questions: breakdown.scored_questions as i32,
            answered_questions: breakdown.answered_questions as i32,
            traffic_light: breakdown.traffic_light.as_str().to_string(),
            submitted_at: now,
        },
    )
    .await?;

    assignments::complete_assignment(&mut *tx, assignment.id, response.id, breakdown.score, now)
        .await?;
    tx.commit().await?;

    tracing::info!(
        assignment_id = %assignment.id,
        response_id = %response.id,
        score = breakdown.score,
        traffic_light = breakdown.traffic_light.as_str(),
        "Check-in submitted"
    );

    Ok(SubmitOutcome {
        response,
        breakdown,
        client,
        form,
    })
}

/// Tells the coach about a new response. Failures are logged only.
pub async fn notify_coach(pool: &PgPool, mailer: &dyn Mailer, config: &AppConfig, outcome: &SubmitOutcome) {
    let Some(email) =
        notifications::compose_completed(config, &outcome.client, &outcome.form, &outcome.response)
    else {
        return;
    };
    let handed_off = notifications::deliver(pool, mailer, &email).await;
    if !handed_off.is_sent() {
        tracing::warn!(response_id = %outcome.response.id, "Completion email was not handed off");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recurring::tests::assignment;
    use chrono::{Duration, TimeZone};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 17, 0, 0).unwrap()
    }

    #[test]
    fn active_series_prefers_latest_running_series() {
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();
        let mut docs = vec![
            assignment(old, Some(1), at(2025, 9, 1)),
            assignment(new, Some(1), at(2026, 1, 5)),
            assignment(new, Some(2), at(2026, 1, 12)),
        ];
        docs[0].total_weeks = 4;

        let active = active_series(&docs, ClientTimezone::utc(), at(2026, 1, 8)).unwrap();
        assert_eq!(active.docs[0].series_id, new);
        assert_eq!(active.schedule.current_week, Some(2));
        assert_eq!(active.week1_due, at(2026, 1, 5));
    }

    #[test]
    fn unfinished_series_is_per_form() {
        let running = Uuid::new_v4();
        let mut doc = assignment(running, Some(1), at(2026, 1, 5));
        doc.form_id = Uuid::new_v4();
        let form_id = doc.form_id;
        let docs = vec![doc];

        let tz = ClientTimezone::utc();
        assert_eq!(unfinished_series(&docs, form_id, tz, at(2026, 1, 8)), Some(running));
        assert_eq!(unfinished_series(&docs, Uuid::new_v4(), tz, at(2026, 1, 8)), None);
        // Scheduled series count too.
        assert_eq!(unfinished_series(&docs, form_id, tz, at(2025, 12, 20)), Some(running));
        // twelve weeks plus grace
        assert_eq!(unfinished_series(&docs, form_id, tz, at(2026, 6, 1)), None);
    }

    #[test]
    fn backfill_audit_lists_created_weeks() {
        let client_id = Uuid::new_v4();
        let series = Uuid::new_v4();
        let event = backfill_event(client_id, series, &[2, 3]);
        assert_eq!(event.actor, SYSTEM_ACTOR);
        assert_eq!(event.resource_type, "series");
        assert_eq!(event.resource_id, series.to_string());
        let details = event.details.unwrap();
        assert_eq!(details["weeks"], json!([2, 3]));
        assert_eq!(details["client_id"], json!(client_id));
    }

    #[test]
    fn finished_series_has_no_current_checkin() {
        let series = Uuid::new_v4();
        let mut doc = assignment(series, Some(1), at(2025, 1, 6));
        doc.total_weeks = 2;
        assert!(active_series(&[doc], ClientTimezone::utc(), at(2026, 1, 8)).is_none());
    }

    #[test]
    fn timezone_shifts_the_current_week() {
        let series = Uuid::new_v4();
        // Due 22:00 Monday in Auckland; `now` is 01:00 Tuesday there.
        let due = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        let docs = vec![assignment(series, Some(1), due)];
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();

        let utc = active_series(&docs, ClientTimezone::utc(), now).unwrap();
        assert_eq!(utc.schedule.current_week, Some(1));

        // Already Tuesday in Auckland, so week 2 is current there.
        let nz = ClientTimezone::parse("Pacific/Auckland").unwrap();
        let local = active_series(&docs, nz, now).unwrap();
        assert_eq!(local.schedule.current_week, Some(2));
    }

    #[test]
    fn views_carry_resolved_weeks_in_due_order() {
        let series = Uuid::new_v4();
        let docs = vec![
            assignment(series, None, at(2026, 1, 19)),
            assignment(series, Some(1), at(2026, 1, 5)),
            assignment(series, None, at(2026, 1, 12) + Duration::hours(2)),
        ];
        let views = with_resolved_weeks(docs);
        let weeks: Vec<i32> = views.iter().map(|v| v.resolved_week).collect();
        assert_eq!(weeks, vec![1, 2, 3]);
    }
}

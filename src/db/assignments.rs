use crate::domain::models::{Answer, AssignmentStatus, CheckInAssignment, FormResponse};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

const ASSIGNMENT_COLUMNS: &str = r#"
    id, series_id, client_id, coach_id, form_id, recurring_week, total_weeks,
    due_date, status, response_id, score, completed_at, reminder_sent_at,
    overdue_notice_sent_at, created_at, updated_at
"#;

const RESPONSE_COLUMNS: &str = r#"
    id, assignment_id, client_id, coach_id, form_id, recurring_week, answers,
    score, scored_questions, answered_questions, traffic_light, submitted_at,
    reviewed_at, coach_notes
"#;

// ========== Assignments ==========

#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub series_id: Uuid,
    pub client_id: Uuid,
    pub coach_id: Uuid,
    pub form_id: Uuid,
    pub recurring_week: Option<i32>,
    pub total_weeks: i32,
    pub due_date: DateTime<Utc>,
    pub status: AssignmentStatus,
}

/// Inserts a week document; `None` when the series already has that week.
pub async fn insert_assignment<'e, E>(executor: E, new: &NewAssignment) -> Result<Option<CheckInAssignment>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, CheckInAssignment>(&format!(
        r#"
        INSERT INTO check_in_assignments
            (id, series_id, client_id, coach_id, form_id, recurring_week, total_weeks, due_date, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT DO NOTHING
        RETURNING {ASSIGNMENT_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(new.series_id)
    .bind(new.client_id)
    .bind(new.coach_id)
    .bind(new.form_id)
    .bind(new.recurring_week)
    .bind(new.total_weeks)
    .bind(new.due_date)
    .bind(new.status)
    .fetch_optional(executor)
    .await?;
    Ok(row)
}

pub async fn find_assignment<'e, E>(executor: E, id: Uuid) -> Result<Option<CheckInAssignment>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, CheckInAssignment>(&format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM check_in_assignments WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;
    Ok(row)
}

/// Row-locks the assignment for the rest of the transaction.
pub async fn lock_assignment<'e, E>(executor: E, id: Uuid) -> Result<Option<CheckInAssignment>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, CheckInAssignment>(&format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM check_in_assignments WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;
    Ok(row)
}

pub async fn list_client_assignments<'e, E>(executor: E, client_id: Uuid) -> Result<Vec<CheckInAssignment>>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, CheckInAssignment>(&format!(
        r#"
        SELECT {ASSIGNMENT_COLUMNS}
        FROM check_in_assignments
        WHERE client_id = $1
        ORDER BY due_date, created_at
        "#
    ))
    .bind(client_id)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

pub async fn list_series(pool: &PgPool, series_id: Uuid) -> Result<Vec<CheckInAssignment>> {
    let rows = sqlx::query_as::<_, CheckInAssignment>(&format!(
        r#"
        SELECT {ASSIGNMENT_COLUMNS}
        FROM check_in_assignments
        WHERE series_id = $1
        ORDER BY due_date, created_at
        "#
    ))
    .bind(series_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn list_assignments_for_clients(pool: &PgPool, client_ids: &[Uuid]) -> Result<Vec<CheckInAssignment>> {
    let rows = sqlx::query_as::<_, CheckInAssignment>(&format!(
        r#"
        SELECT {ASSIGNMENT_COLUMNS}
        FROM check_in_assignments
        WHERE client_id = ANY($1)
        "#
    ))
    .bind(client_ids)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn client_ids_with_assignments(pool: &PgPool) -> Result<Vec<Uuid>> {
    let ids: Vec<Uuid> = sqlx::query_scalar("SELECT DISTINCT client_id FROM check_in_assignments")
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

pub async fn count_form_assignments(pool: &PgPool, form_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM check_in_assignments WHERE form_id = $1")
        .bind(form_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn count_form_responses(pool: &PgPool, form_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM form_responses WHERE form_id = $1")
        .bind(form_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn update_assignment(
    pool: &PgPool,
    id: Uuid,
    due_date: Option<DateTime<Utc>>,
    status: Option<AssignmentStatus>,
) -> Result<Option<CheckInAssignment>> {
    let row = sqlx::query_as::<_, CheckInAssignment>(&format!(
        r#"
        UPDATE check_in_assignments
        SET due_date = COALESCE($2, due_date),
            status = COALESCE($3, status),
            reminder_sent_at = CASE WHEN $2 IS NULL THEN reminder_sent_at END,
            overdue_notice_sent_at = CASE WHEN $2 IS NULL THEN overdue_notice_sent_at END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {ASSIGNMENT_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(due_date)
    .bind(status)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn delete_assignment<'e, E>(executor: E, id: Uuid) -> Result<bool>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM check_in_assignments WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn complete_assignment<'e, E>(
    executor: E,
    id: Uuid,
    response_id: Uuid,
    score: i16,
    completed_at: DateTime<Utc>,
) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        UPDATE check_in_assignments
        SET status = 'completed',
            response_id = $2,
            score = $3,
            completed_at = $4,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(response_id)
    .bind(score)
    .bind(completed_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn set_assignment_week<'e, E>(executor: E, id: Uuid, week: i32) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query("UPDATE check_in_assignments SET recurring_week = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(week)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn clear_assignment_response<'e, E>(executor: E, id: Uuid, status: AssignmentStatus) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        UPDATE check_in_assignments
        SET response_id = NULL,
            score = NULL,
            completed_at = NULL,
            status = $2,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn mark_assignment_overdue<'e, E>(executor: E, id: Uuid) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        "UPDATE check_in_assignments SET status = 'overdue', updated_at = NOW() WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Bulk sweep: pending assignments due before `cutoff` become overdue.
pub async fn mark_overdue_before(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE check_in_assignments
        SET status = 'overdue', updated_at = NOW()
        WHERE status = 'pending' AND due_date < $1
        "#,
    )
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn due_for_reminder(
    pool: &PgPool,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<CheckInAssignment>> {
    let rows = sqlx::query_as::<_, CheckInAssignment>(&format!(
        r#"
        SELECT {ASSIGNMENT_COLUMNS}
        FROM check_in_assignments
        WHERE status = 'pending'
          AND reminder_sent_at IS NULL
          AND due_date BETWEEN $1 AND $2
        ORDER BY due_date
        "#
    ))
    .bind(from)
    .bind(until)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn overdue_without_notice(pool: &PgPool) -> Result<Vec<CheckInAssignment>> {
    let rows = sqlx::query_as::<_, CheckInAssignment>(&format!(
        r#"
        SELECT {ASSIGNMENT_COLUMNS}
        FROM check_in_assignments
        WHERE status = 'overdue'
          AND overdue_notice_sent_at IS NULL
        ORDER BY due_date
        "#
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn stamp_reminder_sent(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE check_in_assignments SET reminder_sent_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn stamp_overdue_notice_sent(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE check_in_assignments SET overdue_notice_sent_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

// ========== Responses ==========

#[derive(Debug, Clone)]
pub struct NewResponse {
    pub assignment_id: Uuid,
    pub client_id: Uuid,
    pub coach_id: Uuid,
    pub form_id: Uuid,
    pub recurring_week: i32,
    pub answers: Vec<Answer>,
    pub score: i16,
    pub scored_questions: i32,
    pub answered_questions: i32,
    pub traffic_light: String,
    pub submitted_at: DateTime<Utc>,
}

pub async fn insert_response<'e, E>(executor: E, new: &NewResponse) -> Result<FormResponse>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, FormResponse>(&format!(
        r#"
        INSERT INTO form_responses
            (id, assignment_id, client_id, coach_id, form_id, recurring_week, answers,
             score, scored_questions, answered_questions, traffic_light, submitted_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING {RESPONSE_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(new.assignment_id)
    .bind(new.client_id)
    .bind(new.coach_id)
    .bind(new.form_id)
    .bind(new.recurring_week)
    .bind(Json(&new.answers))
    .bind(new.score)
    .bind(new.scored_questions)
    .bind(new.answered_questions)
    .bind(&new.traffic_light)
    .bind(new.submitted_at)
    .fetch_one(executor)
    .await?;
    Ok(row)
}

pub async fn find_response(pool: &PgPool, id: Uuid) -> Result<Option<FormResponse>> {
    let row = sqlx::query_as::<_, FormResponse>(&format!(
        "SELECT {RESPONSE_COLUMNS} FROM form_responses WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn list_client_responses<'e, E>(executor: E, client_id: Uuid) -> Result<Vec<FormResponse>>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, FormResponse>(&format!(
        r#"
        SELECT {RESPONSE_COLUMNS}
        FROM form_responses
        WHERE client_id = $1
        ORDER BY submitted_at DESC
        "#
    ))
    .bind(client_id)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

pub async fn list_responses_for_clients(pool: &PgPool, client_ids: &[Uuid]) -> Result<Vec<FormResponse>> {
    let rows = sqlx::query_as::<_, FormResponse>(&format!(
        r#"
        SELECT {RESPONSE_COLUMNS}
        FROM form_responses
        WHERE client_id = ANY($1)
        "#
    ))
    .bind(client_ids)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn repoint_response<'e, E>(executor: E, response_id: Uuid, assignment_id: Uuid) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query("UPDATE form_responses SET assignment_id = $2 WHERE id = $1")
        .bind(response_id)
        .bind(assignment_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn review_response(pool: &PgPool, id: Uuid, coach_notes: Option<&str>) -> Result<Option<FormResponse>> {
    let row = sqlx::query_as::<_, FormResponse>(&format!(
        r#"
        UPDATE form_responses
        SET coach_notes = COALESCE($2, coach_notes),
            reviewed_at = NOW()
        WHERE id = $1
        RETURNING {RESPONSE_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(coach_notes)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

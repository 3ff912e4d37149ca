pub mod assignments;
pub mod seed;

use crate::domain::models::{
    Client, ClientStatus, Form, Notice, OutboxEmail, Question, QuestionOption, QuestionType,
};
use anyhow::Result;
use serde::Deserialize;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

const CLIENT_COLUMNS: &str = r#"
    id, coach_id, first_name, last_name, email, phone, status, timezone,
    onboarding_completed, can_start_checkins, red_max, orange_max,
    created_at, updated_at
"#;

const FORM_COLUMNS: &str = r#"
    id, coach_id, title, description, category, question_ids, is_active,
    created_at, updated_at
"#;

const QUESTION_COLUMNS: &str = r#"
    id, coach_id, text, question_type, question_weight, options,
    yes_is_positive, is_required, category, created_at, updated_at
"#;

// ========== Clients ==========

#[derive(Debug, Deserialize)]
pub struct NewClient {
    pub coach_id: Uuid,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub status: Option<ClientStatus>,
    pub timezone: Option<String>,
    pub red_max: Option<i16>,
    pub orange_max: Option<i16>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClientUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<ClientStatus>,
    pub timezone: Option<String>,
    pub onboarding_completed: Option<bool>,
    pub can_start_checkins: Option<bool>,
    pub red_max: Option<i16>,
    pub orange_max: Option<i16>,
}

pub async fn insert_client(pool: &PgPool, client: &NewClient) -> Result<Client> {
    let row = sqlx::query_as::<_, Client>(&format!(
        r#"
        INSERT INTO clients (id, coach_id, first_name, last_name, email, phone, status, timezone, red_max, orange_max)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {CLIENT_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(client.coach_id)
    .bind(client.first_name.trim())
    .bind(client.last_name.trim())
    .bind(client.email.trim().to_lowercase())
    .bind(client.phone.as_deref())
    .bind(client.status.unwrap_or(ClientStatus::Pending))
    .bind(client.timezone.as_deref().unwrap_or("UTC"))
    .bind(client.red_max.unwrap_or(33))
    .bind(client.orange_max.unwrap_or(80))
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn find_client(pool: &PgPool, id: Uuid) -> Result<Option<Client>> {
    let client = sqlx::query_as::<_, Client>(&format!(
        "SELECT {CLIENT_COLUMNS} FROM clients WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(client)
}

pub async fn find_client_by_email(pool: &PgPool, coach_id: Uuid, email: &str) -> Result<Option<Client>> {
    let client = sqlx::query_as::<_, Client>(&format!(
        "SELECT {CLIENT_COLUMNS} FROM clients WHERE coach_id = $1 AND lower(email) = lower($2)"
    ))
    .bind(coach_id)
    .bind(email.trim())
    .fetch_optional(pool)
    .await?;
    Ok(client)
}

pub async fn list_clients(
    pool: &PgPool,
    coach_id: Uuid,
    status: Option<ClientStatus>,
) -> Result<Vec<Client>> {
    let clients = sqlx::query_as::<_, Client>(&format!(
        r#"
        SELECT {CLIENT_COLUMNS}
        FROM clients
        WHERE coach_id = $1
          AND ($2::client_status IS NULL OR status = $2)
        ORDER BY last_name, first_name
        "#
    ))
    .bind(coach_id)
    .bind(status)
    .fetch_all(pool)
    .await?;
    Ok(clients)
}

pub async fn update_client(pool: &PgPool, id: Uuid, update: &ClientUpdate) -> Result<Option<Client>> {
    let client = sqlx::query_as::<_, Client>(&format!(
        r#"
        UPDATE clients
        SET first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            email = COALESCE($4, email),
            phone = COALESCE($5, phone),
            status = COALESCE($6, status),
            timezone = COALESCE($7, timezone),
            onboarding_completed = COALESCE($8, onboarding_completed),
            can_start_checkins = COALESCE($9, can_start_checkins),
            red_max = COALESCE($10, red_max),
            orange_max = COALESCE($11, orange_max),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {CLIENT_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(update.first_name.as_deref().map(str::trim))
    .bind(update.last_name.as_deref().map(str::trim))
    .bind(update.email.as_deref().map(|e| e.trim().to_lowercase()))
    .bind(update.phone.as_deref())
    .bind(update.status)
    .bind(update.timezone.as_deref())
    .bind(update.onboarding_completed)
    .bind(update.can_start_checkins)
    .bind(update.red_max)
    .bind(update.orange_max)
    .fetch_optional(pool)
    .await?;
    Ok(client)
}

// ========== Questions ==========

#[derive(Debug, Deserialize)]
pub struct NewQuestion {
    /// Library questions are only created by the seed.
    pub coach_id: Uuid,
    pub text: String,
    #[serde(rename = "type")]
    pub qtype: QuestionType,
    pub question_weight: Option<i16>,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    pub yes_is_positive: Option<bool>,
    #[serde(default)]
    pub is_required: bool,
    pub category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QuestionUpdate {
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub qtype: Option<QuestionType>,
    pub question_weight: Option<i16>,
    pub options: Option<Vec<QuestionOption>>,
    pub yes_is_positive: Option<bool>,
    pub is_required: Option<bool>,
    pub category: Option<String>,
}

pub async fn insert_question(pool: &PgPool, question: &NewQuestion) -> Result<Question> {
    let row = sqlx::query_as::<_, Question>(&format!(
        r#"
        INSERT INTO questions (id, coach_id, text, question_type, question_weight, options, yes_is_positive, is_required, category)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {QUESTION_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(question.coach_id)
    .bind(question.text.trim())
    .bind(question.qtype)
    .bind(question.question_weight.unwrap_or(crate::domain::scoring::DEFAULT_QUESTION_WEIGHT))
    .bind(Json(&question.options))
    .bind(question.yes_is_positive.unwrap_or(true))
    .bind(question.is_required)
    .bind(question.category.as_deref())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn find_question(pool: &PgPool, id: Uuid) -> Result<Option<Question>> {
    let question = sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(question)
}

/// Coach's own questions plus the shared library.
pub async fn list_questions(pool: &PgPool, coach_id: Uuid) -> Result<Vec<Question>> {
    let questions = sqlx::query_as::<_, Question>(&format!(
        r#"
        SELECT {QUESTION_COLUMNS}
        FROM questions
        WHERE coach_id = $1 OR coach_id IS NULL
        ORDER BY coach_id NULLS LAST, created_at
        "#
    ))
    .bind(coach_id)
    .fetch_all(pool)
    .await?;
    Ok(questions)
}

pub async fn find_questions_by_ids(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<Question>> {
    let questions = sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ANY($1)"
    ))
    .bind(ids)
    .fetch_all(pool)
    .await?;
    Ok(questions)
}

pub async fn update_question(pool: &PgPool, id: Uuid, update: &QuestionUpdate) -> Result<Option<Question>> {
    let question = sqlx::query_as::<_, Question>(&format!(
        r#"
        UPDATE questions
        SET text = COALESCE($2, text),
            question_type = COALESCE($3, question_type),
            question_weight = COALESCE($4, question_weight),
            options = COALESCE($5, options),
            yes_is_positive = COALESCE($6, yes_is_positive),
            is_required = COALESCE($7, is_required),
            category = COALESCE($8, category),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {QUESTION_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(update.text.as_deref().map(str::trim))
    .bind(update.qtype)
    .bind(update.question_weight)
    .bind(update.options.as_ref().map(Json))
    .bind(update.yes_is_positive)
    .bind(update.is_required)
    .bind(update.category.as_deref())
    .fetch_optional(pool)
    .await?;
    Ok(question)
}

pub async fn count_forms_using_question(pool: &PgPool, question_id: Uuid) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM forms WHERE $1 = ANY(question_ids)")
            .bind(question_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

pub async fn delete_question(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ========== Forms ==========

#[derive(Debug, Deserialize)]
pub struct NewForm {
    pub coach_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub question_ids: Vec<Uuid>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FormUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub question_ids: Option<Vec<Uuid>>,
    pub is_active: Option<bool>,
}

pub async fn insert_form(pool: &PgPool, form: &NewForm) -> Result<Form> {
    let row = sqlx::query_as::<_, Form>(&format!(
        r#"
        INSERT INTO forms (id, coach_id, title, description, category, question_ids, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {FORM_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(form.coach_id)
    .bind(form.title.trim())
    .bind(form.description.as_deref())
    .bind(form.category.as_deref().unwrap_or("general"))
    .bind(&form.question_ids)
    .bind(form.is_active.unwrap_or(true))
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn find_form(pool: &PgPool, id: Uuid) -> Result<Option<Form>> {
    let form = sqlx::query_as::<_, Form>(&format!("SELECT {FORM_COLUMNS} FROM forms WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(form)
}

pub async fn list_forms(pool: &PgPool, coach_id: Uuid, active_only: bool) -> Result<Vec<Form>> {
    let forms = sqlx::query_as::<_, Form>(&format!(
        r#"
        SELECT {FORM_COLUMNS}
        FROM forms
        WHERE coach_id = $1
          AND (NOT $2 OR is_active)
        ORDER BY created_at DESC
        "#
    ))
    .bind(coach_id)
    .bind(active_only)
    .fetch_all(pool)
    .await?;
    Ok(forms)
}

pub async fn update_form(pool: &PgPool, id: Uuid, update: &FormUpdate) -> Result<Option<Form>> {
    let form = sqlx::query_as::<_, Form>(&format!(
        r#"
        UPDATE forms
        SET title = COALESCE($2, title),
            description = COALESCE($3, description),
            category = COALESCE($4, category),
            question_ids = COALESCE($5, question_ids),
            is_active = COALESCE($6, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {FORM_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(update.title.as_deref().map(str::trim))
    .bind(update.description.as_deref())
    .bind(update.category.as_deref())
    .bind(update.question_ids.as_ref())
    .bind(update.is_active)
    .fetch_optional(pool)
    .await?;
    Ok(form)
}

pub async fn delete_form(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM forms WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Questions of a form in the form's order; ids that no longer resolve are skipped.
pub async fn form_questions(pool: &PgPool, form: &Form) -> Result<Vec<Question>> {
    let mut found = find_questions_by_ids(pool, &form.question_ids).await?;
    let mut ordered = Vec::with_capacity(found.len());
    for id in &form.question_ids {
        if let Some(pos) = found.iter().position(|q| q.id == *id) {
            ordered.push(found.swap_remove(pos));
        }
    }
    Ok(ordered)
}

// ========== Notices ==========

pub async fn insert_notice(
    pool: &PgPool,
    coach_id: Uuid,
    client_id: Option<Uuid>,
    title: &str,
    body: &str,
) -> Result<Notice> {
    let notice = sqlx::query_as::<_, Notice>(
        r#"
        INSERT INTO notices (id, coach_id, client_id, title, body)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, coach_id, client_id, title, body, created_at, read_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(coach_id)
    .bind(client_id)
    .bind(title)
    .bind(body)
    .fetch_one(pool)
    .await?;
    Ok(notice)
}

/// Notices addressed to the client directly or broadcast by their coach.
pub async fn list_client_notices(pool: &PgPool, client: &Client) -> Result<Vec<Notice>> {
    let notices = sqlx::query_as::<_, Notice>(
        r#"
        SELECT id, coach_id, client_id, title, body, created_at, read_at
        FROM notices
        WHERE client_id = $1
           OR (client_id IS NULL AND coach_id = $2)
        ORDER BY created_at DESC
        "#,
    )
    .bind(client.id)
    .bind(client.coach_id)
    .fetch_all(pool)
    .await?;
    Ok(notices)
}

pub async fn mark_notice_read(pool: &PgPool, id: Uuid) -> Result<Option<Notice>> {
    let notice = sqlx::query_as::<_, Notice>(
        r#"
        UPDATE notices
        SET read_at = COALESCE(read_at, NOW())
        WHERE id = $1
        RETURNING id, coach_id, client_id, title, body, created_at, read_at
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(notice)
}

pub async fn delete_notice(pool: &PgPool, id: Uuid) -> Result<Option<Notice>> {
    let notice = sqlx::query_as::<_, Notice>(
        r#"
        DELETE FROM notices
        WHERE id = $1
        RETURNING id, coach_id, client_id, title, body, created_at, read_at
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(notice)
}

// ========== Email outbox ==========

#[allow(clippy::too_many_arguments)]
pub async fn insert_outbox_email(
    pool: &PgPool,
    kind: &str,
    recipient: &str,
    subject: &str,
    body: &str,
    assignment_id: Option<Uuid>,
    status: &str,
    error: Option<&str>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO email_outbox (id, kind, recipient, subject, body, assignment_id, status, error, sent_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, CASE WHEN $7 = 'sent' THEN NOW() END)
        "#,
    )
    .bind(id)
    .bind(kind)
    .bind(recipient)
    .bind(subject)
    .bind(body)
    .bind(assignment_id)
    .bind(status)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn recent_outbox(pool: &PgPool, limit: i64) -> Result<Vec<OutboxEmail>> {
    let emails = sqlx::query_as::<_, OutboxEmail>(
        r#"
        SELECT id, kind, recipient, subject, body, assignment_id, status, error, created_at, sent_at
        FROM email_outbox
        ORDER BY created_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(emails)
}

// ========== Audit ==========

pub async fn insert_audit(
    pool: &PgPool,
    actor: &str,
    action: &str,
    resource_type: &str,
    resource_id: &str,
    details: Option<&serde_json::Value>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (id, actor, action, resource_type, resource_id, details)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(actor)
    .bind(action)
    .bind(resource_type)
    .bind(resource_id)
    .bind(details)
    .execute(pool)
    .await?;
    Ok(())
}

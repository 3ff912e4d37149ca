use crate::config::AppConfig;
use crate::db::{self, assignments};
use crate::domain::models::{CheckInAssignment, Client, ClientStatus, Form, FormResponse};
use crate::time_utils::ClientTimezone;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmailKind {
    DueReminder,
    Overdue,
    Completed,
}

impl EmailKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailKind::DueReminder => "due_reminder",
            EmailKind::Overdue => "overdue",
            EmailKind::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutgoingEmail {
    pub kind: EmailKind,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub assignment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to an external transport.
    Sent,
    /// Only written to the log and the outbox.
    Logged,
}

impl Delivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            Delivery::Sent => "sent",
            Delivery::Logged => "logged",
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, email: &OutgoingEmail) -> Result<Delivery>;
}

pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<Delivery> {
        tracing::info!(
            kind = email.kind.as_str(),
            to = %email.to,
            subject = %email.subject,
            "Email logged (no transport configured)"
        );
        Ok(Delivery::Logged)
    }
}

/// Posts each email as JSON to a webhook that owns the actual delivery.
pub struct WebhookMailer {
    client: reqwest::Client,
    url: String,
}

impl WebhookMailer {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<Delivery> {
        self.client
            .post(&self.url)
            .json(email)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| anyhow!("email webhook rejected message: {e}"))?;
        Ok(Delivery::Sent)
    }
}

pub fn mailer_from_config(config: &AppConfig) -> Result<std::sync::Arc<dyn Mailer>> {
    Ok(match &config.email_webhook_url {
        Some(url) => std::sync::Arc::new(WebhookMailer::new(url.clone())?),
        None => std::sync::Arc::new(LogMailer),
    })
}

fn checkin_link(base_url: &str, assignment_id: Uuid) -> String {
    format!("{base_url}/check-ins/{assignment_id}")
}

fn week_label(assignment: &CheckInAssignment) -> String {
    match assignment.recurring_week {
        Some(week) if assignment.total_weeks > 1 => {
            format!(" (week {week} of {})", assignment.total_weeks)
        }
        _ => String::new(),
    }
}

pub fn compose_due_reminder(
    config: &AppConfig,
    client: &Client,
    form: &Form,
    assignment: &CheckInAssignment,
) -> OutgoingEmail {
    let tz = ClientTimezone::parse_or_utc(&client.timezone);
    OutgoingEmail {
        kind: EmailKind::DueReminder,
        from: config.email_from.clone(),
        to: client.email.clone(),
        subject: format!("Reminder: {} is due soon", form.title),
        body: format!(
            "Hi {},\n\nYour check-in \"{}\"{} is due {}.\n\nComplete it here: {}\n",
            client.first_name,
            form.title,
            week_label(assignment),
            tz.format(assignment.due_date),
            checkin_link(&config.app_base_url, assignment.id),
        ),
        assignment_id: Some(assignment.id),
    }
}

pub fn compose_overdue_notice(
    config: &AppConfig,
    client: &Client,
    form: &Form,
    assignment: &CheckInAssignment,
) -> OutgoingEmail {
    let tz = ClientTimezone::parse_or_utc(&client.timezone);
    OutgoingEmail {
        kind: EmailKind::Overdue,
        from: config.email_from.clone(),
        to: client.email.clone(),
        subject: format!("Overdue: {}", form.title),
        body: format!(
            "Hi {},\n\nYour check-in \"{}\"{} was due {} and has not been submitted yet.\n\nYou can still complete it here: {}\n",
            client.first_name,
            form.title,
            week_label(assignment),
            tz.format(assignment.due_date),
            checkin_link(&config.app_base_url, assignment.id),
        ),
        assignment_id: Some(assignment.id),
    }
}

/// Coach-facing notice for a submitted response; `None` without a coach inbox.
pub fn compose_completed(
    config: &AppConfig,
    client: &Client,
    form: &Form,
    response: &FormResponse,
) -> Option<OutgoingEmail> {
    let to = config.coach_notify_email.clone()?;
    Some(OutgoingEmail {
        kind: EmailKind::Completed,
        from: config.email_from.clone(),
        to,
        subject: format!("{} completed {}", client.display_name(), form.title),
        body: format!(
            "{} submitted \"{}\"{}.\n\nScore: {}% ({})\nAnswered: {} questions\n\nReview: {}/responses/{}\n",
            client.display_name(),
            form.title,
            response
                .recurring_week
                .map(|w| format!(" for week {w}"))
                .unwrap_or_default(),
            response.score,
            response.traffic_light,
            response.answered_questions,
            config.app_base_url,
            response.id,
        ),
        assignment_id: response.assignment_id,
    })
}

/// Hands the email to the mailer and records the outcome in the outbox.
/// Result of one hand-off attempt as written to the outbox.
#[derive(Debug, Clone, PartialEq)]
pub struct HandOff {
    pub status: &'static str,
    pub error: Option<String>,
}

impl HandOff {
    pub fn is_sent(&self) -> bool {
        self.error.is_none()
    }
}

async fn hand_off(mailer: &dyn Mailer, email: &OutgoingEmail) -> HandOff {
    match mailer.send(email).await {
        Ok(delivery) => HandOff {
            status: delivery.as_str(),
            error: None,
        },
        Err(e) => {
            tracing::warn!(
                mailer = mailer.name(),
                kind = email.kind.as_str(),
                to = %email.to,
                "Email hand-off failed: {}",
                e
            );
            HandOff {
                status: "failed",
                error: Some(e.to_string()),
            }
        }
    }
}

/// Hands the email to the mailer and records the attempt in the outbox.
/// An outbox write failure is logged; the hand-off result still stands.
pub async fn deliver(pool: &PgPool, mailer: &dyn Mailer, email: &OutgoingEmail) -> HandOff {
    let outcome = hand_off(mailer, email).await;
    if let Err(e) = db::insert_outbox_email(
        pool,
        email.kind.as_str(),
        &email.to,
        &email.subject,
        &email.body,
        email.assignment_id,
        outcome.status,
        outcome.error.as_deref(),
    )
    .await
    {
        tracing::warn!(
            kind = email.kind.as_str(),
            assignment_id = ?email.assignment_id,
            "Failed to record outbox email: {}",
            e
        );
    }
    outcome
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ReminderReport {
    pub reminders_sent: usize,
    pub overdue_notices_sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ReminderReport {
    fn tally(&mut self, kind: EmailKind, outcome: &HandOff) {
        match (outcome.is_sent(), kind) {
            (false, _) => self.failed += 1,
            (true, EmailKind::Overdue) => self.overdue_notices_sent += 1,
            (true, _) => self.reminders_sent += 1,
        }
    }
}

/// Clients who should not receive check-in emails.
fn is_muted(client: &Client) -> bool {
    matches!(client.status, ClientStatus::Archived | ClientStatus::Suspended)
}

struct Lookup<'a> {
    pool: &'a PgPool,
    clients: HashMap<Uuid, Option<Client>>,
    forms: HashMap<Uuid, Option<Form>>,
}

impl<'a> Lookup<'a> {
    fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            clients: HashMap::new(),
            forms: HashMap::new(),
        }
    }

    async fn client_and_form(&mut self, a: &CheckInAssignment) -> Result<Option<(Client, Form)>> {
        if !self.clients.contains_key(&a.client_id) {
            let client = db::find_client(self.pool, a.client_id).await?;
            self.clients.insert(a.client_id, client);
        }
        if !self.forms.contains_key(&a.form_id) {
            let form = db::find_form(self.pool, a.form_id).await?;
            self.forms.insert(a.form_id, form);
        }
        let client = self.clients.get(&a.client_id).cloned().flatten();
        let form = self.forms.get(&a.form_id).cloned().flatten();
        Ok(client.zip(form))
    }
}

/// Sends due-soon reminders and overdue notices that have not gone out yet.
pub async fn run_reminder_sweep(
    pool: &PgPool,
    mailer: &dyn Mailer,
    config: &AppConfig,
    now: DateTime<Utc>,
) -> Result<ReminderReport> {
    let mut report = ReminderReport::default();
    let mut lookup = Lookup::new(pool);

    let due_soon = assignments::due_for_reminder(pool, now, now + config.reminder_lookahead()).await?;
    for assignment in &due_soon {
        let Some((client, form)) = lookup.client_and_form(assignment).await? else {
            report.skipped += 1;
            continue;
        };
        if is_muted(&client) {
            report.skipped += 1;
            continue;
        }
        let email = compose_due_reminder(config, &client, &form, assignment);
        let outcome = deliver(pool, mailer, &email).await;
        // Stamped after any attempt; failures stay in the outbox and are not retried.
        if let Err(e) = assignments::stamp_reminder_sent(pool, assignment.id).await {
            tracing::warn!(assignment_id = %assignment.id, "Failed to stamp reminder: {}", e);
        }
        report.tally(email.kind, &outcome);
    }

    let overdue = assignments::overdue_without_notice(pool).await?;
    for assignment in &overdue {
        let Some((client, form)) = lookup.client_and_form(assignment).await? else {
            report.skipped += 1;
            continue;
        };
        if is_muted(&client) {
            report.skipped += 1;
            continue;
        }
        let email = compose_overdue_notice(config, &client, &form, assignment);
        let outcome = deliver(pool, mailer, &email).await;
        if let Err(e) = assignments::stamp_overdue_notice_sent(pool, assignment.id).await {
            tracing::warn!(assignment_id = %assignment.id, "Failed to stamp overdue notice: {}", e);
        }
        report.tally(email.kind, &outcome);
    }

    if report.reminders_sent + report.overdue_notices_sent + report.failed > 0 {
        tracing::info!(
            reminders = report.reminders_sent,
            overdue = report.overdue_notices_sent,
            failed = report.failed,
            "Reminder sweep finished"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sqlx::types::Json;

    fn config(coach_inbox: Option<&str>) -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/test".into(),
            bind_addr: "127.0.0.1:0".into(),
            db_max_connections: 1,
            app_base_url: "https://coach.example.com".into(),
            email_from: "checkins@coach.example.com".into(),
            email_webhook_url: None,
            coach_notify_email: coach_inbox.map(str::to_string),
            reminder_lookahead_hours: 24,
            overdue_grace_hours: 0,
            submit_rate_limit: 10,
        }
    }

    fn client() -> Client {
        Client {
            id: Uuid::new_v4(),
            coach_id: Uuid::new_v4(),
            first_name: "Mia".into(),
            last_name: "Stone".into(),
            email: "mia@example.com".into(),
            phone: None,
            status: ClientStatus::Active,
            timezone: "Australia/Perth".into(),
            onboarding_completed: true,
            can_start_checkins: true,
            red_max: 33,
            orange_max: 80,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn form() -> Form {
        Form {
            id: Uuid::new_v4(),
            coach_id: Uuid::new_v4(),
            title: "Weekly check-in".into(),
            description: None,
            category: "general".into(),
            question_ids: vec![],
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn reminder_uses_client_timezone_and_link() {
        let due = Utc.with_ymd_and_hms(2026, 3, 2, 16, 30, 0).unwrap();
        let mut a = crate::domain::recurring::tests::assignment(Uuid::new_v4(), Some(3), due);
        a.total_weeks = 8;

        let email = compose_due_reminder(&config(None), &client(), &form(), &a);
        assert_eq!(email.kind, EmailKind::DueReminder);
        assert_eq!(email.to, "mia@example.com");
        assert_eq!(email.subject, "Reminder: Weekly check-in is due soon");
        // Perth is UTC+8
        assert!(email.body.contains("Tue 03 Mar 2026, 00:30"), "{}", email.body);
        assert!(email.body.contains("(week 3 of 8)"));
        assert!(email
            .body
            .contains(&format!("https://coach.example.com/check-ins/{}", a.id)));
        assert_eq!(email.assignment_id, Some(a.id));
    }

    #[test]
    fn single_week_assignments_have_no_week_label() {
        let due = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let mut a = crate::domain::recurring::tests::assignment(Uuid::new_v4(), Some(1), due);
        a.total_weeks = 1;
        let email = compose_overdue_notice(&config(None), &client(), &form(), &a);
        assert_eq!(email.subject, "Overdue: Weekly check-in");
        assert!(!email.body.contains("week 1"));
    }

    #[test]
    fn completed_notice_needs_coach_inbox() {
        let c = client();
        let response = FormResponse {
            id: Uuid::new_v4(),
            assignment_id: Some(Uuid::new_v4()),
            client_id: c.id,
            coach_id: c.coach_id,
            form_id: Uuid::new_v4(),
            recurring_week: Some(2),
            answers: Json(vec![]),
            score: 72,
            scored_questions: 3,
            answered_questions: 4,
            traffic_light: "orange".into(),
            submitted_at: Utc::now(),
            reviewed_at: None,
            coach_notes: None,
        };

        assert!(compose_completed(&config(None), &c, &form(), &response).is_none());

        let email = compose_completed(&config(Some("coach@example.com")), &c, &form(), &response)
            .expect("email");
        assert_eq!(email.to, "coach@example.com");
        assert_eq!(email.subject, "Mia Stone completed Weekly check-in");
        assert!(email.body.contains("Score: 72% (orange)"));
        assert!(email.body.contains("for week 2"));
    }

    struct RejectingMailer;

    #[async_trait]
    impl Mailer for RejectingMailer {
        fn name(&self) -> &'static str {
            "rejecting"
        }

        async fn send(&self, _email: &OutgoingEmail) -> Result<Delivery> {
            Err(anyhow!("webhook returned 502"))
        }
    }

    fn unreachable_pool() -> PgPool {
        sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy("postgres://127.0.0.1:1/unused")
            .unwrap()
    }

    #[tokio::test]
    async fn failed_hand_off_is_reported_not_raised() {
        let a = crate::domain::recurring::tests::assignment(Uuid::new_v4(), Some(1), Utc::now());
        let email = compose_overdue_notice(&config(None), &client(), &form(), &a);

        let outcome = deliver(&unreachable_pool(), &RejectingMailer, &email).await;
        assert_eq!(outcome.status, "failed");
        assert!(outcome.error.unwrap().contains("502"));
    }

    #[tokio::test]
    async fn outbox_write_failure_keeps_the_hand_off_result() {
        let a = crate::domain::recurring::tests::assignment(Uuid::new_v4(), Some(1), Utc::now());
        let email = compose_due_reminder(&config(None), &client(), &form(), &a);

        let outcome = deliver(&unreachable_pool(), &LogMailer, &email).await;
        assert!(outcome.is_sent());
        assert_eq!(outcome.status, "logged");
    }

    #[test]
    fn report_tallies_by_kind_and_outcome() {
        let sent = HandOff { status: "sent", error: None };
        let failed = HandOff { status: "failed", error: Some("timeout".into()) };
        let mut report = ReminderReport::default();
        report.tally(EmailKind::DueReminder, &sent);
        report.tally(EmailKind::Overdue, &sent);
        report.tally(EmailKind::Overdue, &failed);
        assert_eq!(report.reminders_sent, 1);
        assert_eq!(report.overdue_notices_sent, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn log_mailer_never_fails() {
        let a = crate::domain::recurring::tests::assignment(Uuid::new_v4(), Some(1), Utc::now());
        let email = compose_due_reminder(&config(None), &client(), &form(), &a);
        assert_eq!(LogMailer.send(&email).await.unwrap(), Delivery::Logged);
    }
}

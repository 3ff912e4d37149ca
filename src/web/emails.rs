use crate::db;
use crate::domain::models::OutboxEmail;
use crate::services::audit::{AuditEvent, SYSTEM_ACTOR};
use crate::services::notifications::{self, ReminderReport};
use crate::state::SharedState;
use crate::web::error::{ok, ApiResult};
use crate::web::extract::Query;
use axum::{extract::State, routing::{get, post}, Router};
use serde::Deserialize;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct OutboxQuery {
    pub limit: Option<i64>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(recent_emails))
        .route("/reminders", post(send_reminders))
        .with_state(state)
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

async fn recent_emails(
    State(state): State<SharedState>,
    Query(query): Query<OutboxQuery>,
) -> ApiResult<Vec<OutboxEmail>> {
    ok(db::recent_outbox(&state.pool, clamp_limit(query.limit)).await?)
}

async fn send_reminders(State(state): State<SharedState>) -> ApiResult<ReminderReport> {
    let report = notifications::run_reminder_sweep(
        &state.pool,
        state.mailer.as_ref(),
        &state.config,
        chrono::Utc::now(),
    )
    .await?;
    AuditEvent::new(SYSTEM_ACTOR, "emails.reminders", "email_outbox", "sweep")
        .with_details(serde_json::json!({
            "reminders": report.reminders_sent,
            "overdue": report.overdue_notices_sent,
            "failed": report.failed,
        }))
        .record(&state.pool)
        .await;
    ok(report)
}

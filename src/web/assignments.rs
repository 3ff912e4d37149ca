use crate::db::{self, assignments, assignments::NewAssignment};
use crate::domain::models::{Answer, AssignmentStatus, CheckInAssignment, ClientStatus};
use crate::domain::recurring::{derive_status, resolve_week, week1_due_date};
use crate::domain::submission::SubmissionError;
use crate::services::audit::{client_actor, coach_actor, AuditEvent};
use crate::services::checkins::{self, AssignmentView, SubmitOutcome};
use crate::state::SharedState;
use crate::time_utils::ClientTimezone;
use crate::web::error::{ok, ApiError, ApiResult};
use crate::web::extract::{Json, Path};
use axum::{extract::State, routing::{get, post}, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

pub const MAX_TOTAL_WEEKS: i32 = 52;

#[derive(Debug, Deserialize)]
pub struct CreateAssignmentPayload {
    pub client_id: Uuid,
    pub form_id: Uuid,
    /// Due date of week 1; later weeks follow every seven days.
    pub due_date: DateTime<Utc>,
    pub total_weeks: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAssignmentPayload {
    pub due_date: Option<DateTime<Utc>>,
    pub status: Option<AssignmentStatus>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitPayload {
    pub client_id: Uuid,
    pub answers: Vec<Answer>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", post(create_assignment))
        .route(
            "/:id",
            get(get_assignment)
                .patch(update_assignment)
                .delete(delete_assignment),
        )
        .route("/:id/submit", post(submit_assignment))
        .with_state(state)
}

async fn load_assignment(state: &SharedState, id: Uuid) -> Result<CheckInAssignment, ApiError> {
    assignments::find_assignment(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("assignment"))
}

async fn create_assignment(
    State(state): State<SharedState>,
    Json(payload): Json<CreateAssignmentPayload>,
) -> ApiResult<CheckInAssignment> {
    let total_weeks = payload.total_weeks.unwrap_or(1);
    if !(1..=MAX_TOTAL_WEEKS).contains(&total_weeks) {
        return Err(ApiError::BadRequest(format!(
            "total_weeks must be between 1 and {MAX_TOTAL_WEEKS}"
        )));
    }

    let client = db::find_client(&state.pool, payload.client_id)
        .await?
        .ok_or_else(|| ApiError::not_found("client"))?;
    if client.status == ClientStatus::Archived {
        return Err(ApiError::Conflict("client is archived".to_string()));
    }
    let form = db::find_form(&state.pool, payload.form_id)
        .await?
        .filter(|f| f.coach_id == client.coach_id)
        .ok_or_else(|| ApiError::not_found("form"))?;
    if !form.is_active {
        return Err(ApiError::Conflict("form is not active".to_string()));
    }

    let now = Utc::now();
    let existing = assignments::list_client_assignments(&state.pool, client.id).await?;
    let tz = ClientTimezone::parse_or_utc(&client.timezone);
    if let Some(series_id) = checkins::unfinished_series(&existing, form.id, tz, now) {
        return Err(ApiError::Conflict(format!(
            "client already has an unfinished series for this form ({series_id})"
        )));
    }

    let assignment = assignments::insert_assignment(
        &state.pool,
        &NewAssignment {
            series_id: Uuid::new_v4(),
            client_id: client.id,
            coach_id: client.coach_id,
            form_id: form.id,
            recurring_week: Some(1),
            total_weeks,
            due_date: payload.due_date,
            status: derive_status(
                AssignmentStatus::Pending,
                payload.due_date,
                now,
                state.config.overdue_grace(),
            ),
        },
    )
    .await?
    .ok_or_else(|| ApiError::Conflict("assignment already exists".to_string()))?;

    AuditEvent::new(coach_actor(client.coach_id), "assignment.create", "assignment", assignment.id)
        .with_details(json!({
            "client_id": client.id,
            "form_id": form.id,
            "total_weeks": total_weeks,
        }))
        .record(&state.pool)
        .await;
    ok(assignment)
}

async fn get_assignment(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<AssignmentView> {
    let assignment = load_assignment(&state, id).await?;
    let series = assignments::list_series(&state.pool, assignment.series_id).await?;
    let resolved_week = resolve_week(
        assignment.recurring_week,
        assignment.due_date,
        week1_due_date(&series),
    );
    ok(AssignmentView {
        assignment,
        resolved_week,
    })
}

async fn update_assignment(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAssignmentPayload>,
) -> ApiResult<CheckInAssignment> {
    if payload.status == Some(AssignmentStatus::Completed) {
        return Err(ApiError::BadRequest(
            "assignments are completed by submitting a response".to_string(),
        ));
    }
    let current = load_assignment(&state, id).await?;
    if current.status == AssignmentStatus::Completed && payload.status.is_some() {
        return Err(ApiError::Conflict("assignment is already completed".to_string()));
    }

    // A new due date re-derives the status unless one was given explicitly.
    let status = match (payload.status, payload.due_date) {
        (Some(status), _) => Some(status),
        (None, Some(due)) if current.status != AssignmentStatus::Completed => Some(derive_status(
            current.status,
            due,
            Utc::now(),
            state.config.overdue_grace(),
        )),
        _ => None,
    };

    let assignment = assignments::update_assignment(&state.pool, id, payload.due_date, status)
        .await?
        .ok_or_else(|| ApiError::not_found("assignment"))?;
    AuditEvent::new(coach_actor(assignment.coach_id), "assignment.update", "assignment", id)
        .with_details(json!({ "due_date": payload.due_date, "status": status }))
        .record(&state.pool)
        .await;
    ok(assignment)
}

async fn delete_assignment(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<Uuid> {
    let assignment = load_assignment(&state, id).await?;
    assignments::delete_assignment(&state.pool, id).await?;
    AuditEvent::new(coach_actor(assignment.coach_id), "assignment.delete", "assignment", id)
        .with_details(json!({ "client_id": assignment.client_id, "status": assignment.status }))
        .record(&state.pool)
        .await;
    ok(id)
}

async fn submit_assignment(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitPayload>,
) -> ApiResult<SubmitOutcome> {
    if !state
        .submit_limiter
        .check(&payload.client_id.to_string())
        .await
    {
        tracing::warn!(client_id = %payload.client_id, "Submission rate limit exceeded");
        return Err(ApiError::TooManyRequests(
            "too many submissions, try again later".to_string(),
        ));
    }
    if payload.answers.is_empty() {
        return Err(SubmissionError::Empty.into());
    }

    let outcome = checkins::submit(
        &state.pool,
        id,
        payload.client_id,
        payload.answers,
        Utc::now(),
    )
    .await?;

    checkins::notify_coach(&state.pool, state.mailer.as_ref(), &state.config, &outcome).await;
    AuditEvent::new(client_actor(payload.client_id), "assignment.submit", "assignment", id)
        .with_details(json!({
            "response_id": outcome.response.id,
            "score": outcome.response.score,
        }))
        .record(&state.pool)
        .await;
    ok(outcome)
}

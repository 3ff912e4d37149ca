use crate::db::assignments;
use crate::domain::models::FormResponse;
use crate::services::audit::{coach_actor, AuditEvent};
use crate::state::SharedState;
use crate::web::error::{ok, ApiError, ApiResult};
use crate::web::extract::{Json, Path};
use axum::{extract::State, routing::{get, post}, Router};
use serde::Deserialize;
use uuid::Uuid;

const MAX_NOTES_LEN: usize = 10_000;

#[derive(Debug, Deserialize)]
pub struct ReviewPayload {
    pub coach_notes: Option<String>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/:id", get(get_response))
        .route("/:id/review", post(review_response))
        .with_state(state)
}

async fn get_response(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<FormResponse> {
    let response = assignments::find_response(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("response"))?;
    ok(response)
}

async fn review_response(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewPayload>,
) -> ApiResult<FormResponse> {
    let notes = payload
        .coach_notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    if notes.map_or(false, |n| n.chars().count() > MAX_NOTES_LEN) {
        return Err(ApiError::BadRequest(format!(
            "coach_notes cannot exceed {MAX_NOTES_LEN} characters"
        )));
    }

    let response = assignments::review_response(&state.pool, id, notes)
        .await?
        .ok_or_else(|| ApiError::not_found("response"))?;
    AuditEvent::new(coach_actor(response.coach_id), "response.review", "response", id)
        .record(&state.pool)
        .await;
    ok(response)
}

use crate::db::{self, assignments, FormUpdate, NewForm};
use crate::domain::models::{Form, Question};
use crate::services::audit::{coach_actor, AuditEvent};
use crate::state::SharedState;
use crate::web::error::{ok, ApiError, ApiResult};
use crate::web::extract::{Json, Path, Query};
use axum::{extract::State, routing::get, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct FormListQuery {
    pub coach_id: Uuid,
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Serialize)]
pub struct FormWithQuestions {
    #[serde(flatten)]
    pub form: Form,
    pub questions: Vec<Question>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_forms).post(create_form))
        .route("/:id", get(get_form).patch(update_form).delete(delete_form))
        .with_state(state)
}

/// Question ids must be unique and resolve to the coach's own or library questions.
async fn check_question_ids(state: &SharedState, coach_id: Uuid, ids: &[Uuid]) -> Result<(), ApiError> {
    let unique: HashSet<Uuid> = ids.iter().copied().collect();
    if unique.len() != ids.len() {
        return Err(ApiError::BadRequest("question_ids contains duplicates".to_string()));
    }

    let found = db::find_questions_by_ids(&state.pool, ids).await?;
    let usable: HashSet<Uuid> = found
        .iter()
        .filter(|q| q.coach_id.map_or(true, |owner| owner == coach_id))
        .map(|q| q.id)
        .collect();
    match ids.iter().find(|id| !usable.contains(id)) {
        Some(missing) => Err(ApiError::BadRequest(format!("unknown question: {missing}"))),
        None => Ok(()),
    }
}

async fn load_form(state: &SharedState, id: Uuid) -> Result<Form, ApiError> {
    db::find_form(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("form"))
}

async fn list_forms(
    State(state): State<SharedState>,
    Query(query): Query<FormListQuery>,
) -> ApiResult<Vec<Form>> {
    ok(db::list_forms(&state.pool, query.coach_id, query.active_only).await?)
}

async fn create_form(State(state): State<SharedState>, Json(payload): Json<NewForm>) -> ApiResult<Form> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title is required".to_string()));
    }
    check_question_ids(&state, payload.coach_id, &payload.question_ids).await?;

    let form = db::insert_form(&state.pool, &payload).await?;
    AuditEvent::new(coach_actor(form.coach_id), "form.create", "form", form.id)
        .with_details(json!({ "title": form.title, "questions": form.question_ids.len() }))
        .record(&state.pool)
        .await;
    ok(form)
}

async fn get_form(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<FormWithQuestions> {
    let form = load_form(&state, id).await?;
    let questions = db::form_questions(&state.pool, &form).await?;
    ok(FormWithQuestions { form, questions })
}

async fn update_form(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<FormUpdate>,
) -> ApiResult<Form> {
    let current = load_form(&state, id).await?;
    if matches!(payload.title.as_deref(), Some(title) if title.trim().is_empty()) {
        return Err(ApiError::BadRequest("title cannot be empty".to_string()));
    }
    if let Some(ids) = payload.question_ids.as_deref() {
        check_question_ids(&state, current.coach_id, ids).await?;
    }

    let form = db::update_form(&state.pool, id, &payload)
        .await?
        .ok_or_else(|| ApiError::not_found("form"))?;
    AuditEvent::new(coach_actor(form.coach_id), "form.update", "form", id)
        .record(&state.pool)
        .await;
    ok(form)
}

async fn delete_form(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<Uuid> {
    let form = load_form(&state, id).await?;
    let assigned = assignments::count_form_assignments(&state.pool, id).await?;
    if assigned > 0 {
        return Err(ApiError::Conflict(format!(
            "form is used by {assigned} assignment(s); deactivate it instead"
        )));
    }
    let answered = assignments::count_form_responses(&state.pool, id).await?;
    if answered > 0 {
        return Err(ApiError::Conflict(format!(
            "form has {answered} response(s); deactivate it instead"
        )));
    }

    db::delete_form(&state.pool, id).await?;
    AuditEvent::new(coach_actor(form.coach_id), "form.delete", "form", id)
        .with_details(json!({ "title": form.title }))
        .record(&state.pool)
        .await;
    ok(id)
}

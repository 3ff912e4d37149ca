use crate::db::{self, NewQuestion, QuestionUpdate};
use crate::domain::models::{Question, QuestionOption, QuestionType};
use crate::services::audit::{coach_actor, AuditEvent, SYSTEM_ACTOR};
use crate::state::SharedState;
use crate::web::error::{ok, ApiError, ApiResult};
use crate::web::extract::{Json, Path, Query};
use axum::{extract::State, routing::get, Router};
use serde::Deserialize;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct QuestionListQuery {
    pub coach_id: Uuid,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_questions).post(create_question))
        .route(
            "/:id",
            get(get_question)
                .patch(update_question)
                .delete(delete_question),
        )
        .with_state(state)
}

fn validate_definition(
    qtype: QuestionType,
    weight: i16,
    options: &[QuestionOption],
) -> Result<(), ApiError> {
    if !(0..=10).contains(&weight) {
        return Err(ApiError::BadRequest(
            "question_weight must be between 0 and 10".to_string(),
        ));
    }
    if qtype != QuestionType::MultipleChoice {
        return Ok(());
    }

    if options.is_empty() {
        return Err(ApiError::BadRequest(
            "multiple_choice questions need at least one option".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for option in options {
        let key = option.text.trim().to_lowercase();
        if key.is_empty() {
            return Err(ApiError::BadRequest("option text cannot be empty".to_string()));
        }
        if !seen.insert(key) {
            return Err(ApiError::BadRequest(format!(
                "duplicate option: {}",
                option.text.trim()
            )));
        }
        if matches!(option.weight, Some(w) if !(0.0..=10.0).contains(&w)) {
            return Err(ApiError::BadRequest(
                "option weights must be between 0 and 10".to_string(),
            ));
        }
    }
    Ok(())
}

fn actor_for(question: &Question) -> String {
    question
        .coach_id
        .map(coach_actor)
        .unwrap_or_else(|| SYSTEM_ACTOR.to_string())
}

async fn load_question(state: &SharedState, id: Uuid) -> Result<Question, ApiError> {
    db::find_question(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("question"))
}

async fn list_questions(
    State(state): State<SharedState>,
    Query(query): Query<QuestionListQuery>,
) -> ApiResult<Vec<Question>> {
    ok(db::list_questions(&state.pool, query.coach_id).await?)
}

async fn create_question(
    State(state): State<SharedState>,
    Json(payload): Json<NewQuestion>,
) -> ApiResult<Question> {
    if payload.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text is required".to_string()));
    }
    let weight = payload
        .question_weight
        .unwrap_or(crate::domain::scoring::DEFAULT_QUESTION_WEIGHT);
    validate_definition(payload.qtype, weight, &payload.options)?;

    let question = db::insert_question(&state.pool, &payload).await?;
    AuditEvent::new(actor_for(&question), "question.create", "question", question.id)
        .record(&state.pool)
        .await;
    ok(question)
}

async fn get_question(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<Question> {
    ok(load_question(&state, id).await?)
}

async fn update_question(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<QuestionUpdate>,
) -> ApiResult<Question> {
    let current = load_question(&state, id).await?;
    if current.coach_id.is_none() {
        return Err(ApiError::Conflict("library questions are read-only".to_string()));
    }
    if matches!(payload.text.as_deref(), Some(text) if text.trim().is_empty()) {
        return Err(ApiError::BadRequest("text cannot be empty".to_string()));
    }
    validate_definition(
        payload.qtype.unwrap_or(current.qtype),
        payload.question_weight.unwrap_or(current.question_weight),
        payload.options.as_deref().unwrap_or(current.options.0.as_slice()),
    )?;

    let question = db::update_question(&state.pool, id, &payload)
        .await?
        .ok_or_else(|| ApiError::not_found("question"))?;
    AuditEvent::new(actor_for(&question), "question.update", "question", id)
        .record(&state.pool)
        .await;
    ok(question)
}

async fn delete_question(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<Uuid> {
    let question = load_question(&state, id).await?;
    if question.coach_id.is_none() {
        return Err(ApiError::Conflict("library questions are read-only".to_string()));
    }
    let used_by = db::count_forms_using_question(&state.pool, id).await?;
    if used_by > 0 {
        return Err(ApiError::Conflict(format!(
            "question is used by {used_by} form(s)"
        )));
    }

    db::delete_question(&state.pool, id).await?;
    AuditEvent::new(actor_for(&question), "question.delete", "question", id)
        .record(&state.pool)
        .await;
    ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(text: &str, weight: Option<f64>) -> QuestionOption {
        QuestionOption {
            text: text.to_string(),
            weight,
        }
    }

    #[test]
    fn weight_range_enforced() {
        assert!(validate_definition(QuestionType::Scale, 10, &[]).is_ok());
        assert!(validate_definition(QuestionType::Scale, 0, &[]).is_ok());
        assert!(validate_definition(QuestionType::Scale, 11, &[]).is_err());
        assert!(validate_definition(QuestionType::Boolean, -1, &[]).is_err());
    }

    #[test]
    fn multiple_choice_options_checked() {
        let qtype = QuestionType::MultipleChoice;
        assert!(validate_definition(qtype, 5, &[]).is_err());
        assert!(validate_definition(qtype, 5, &[option("Yes", Some(10.0)), option(" yes", None)]).is_err());
        assert!(validate_definition(qtype, 5, &[option("A", Some(12.0))]).is_err());
        assert!(validate_definition(qtype, 5, &[option("A", Some(10.0)), option("B", None)]).is_ok());
    }
}

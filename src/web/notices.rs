use crate::db;
use crate::domain::models::Notice;
use crate::services::audit::{client_actor, coach_actor, AuditEvent};
use crate::state::SharedState;
use crate::web::error::{ok, ApiError, ApiResult};
use crate::web::extract::{Json, Path};
use axum::{extract::State, routing::{delete, post}, Router};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct NewNoticePayload {
    pub coach_id: Uuid,
    /// Omit to address every client of the coach.
    pub client_id: Option<Uuid>,
    pub title: String,
    pub body: String,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", post(create_notice))
        .route("/:id/read", post(mark_read))
        .route("/:id", delete(delete_notice))
        .with_state(state)
}

async fn create_notice(
    State(state): State<SharedState>,
    Json(payload): Json<NewNoticePayload>,
) -> ApiResult<Notice> {
    let title = payload.title.trim();
    let body = payload.body.trim();
    if title.is_empty() || body.is_empty() {
        return Err(ApiError::BadRequest("title and body are required".to_string()));
    }

    if let Some(client_id) = payload.client_id {
        db::find_client(&state.pool, client_id)
            .await?
            .filter(|c| c.coach_id == payload.coach_id)
            .ok_or_else(|| ApiError::not_found("client"))?;
    }

    let notice = db::insert_notice(&state.pool, payload.coach_id, payload.client_id, title, body).await?;
    AuditEvent::new(coach_actor(notice.coach_id), "notice.create", "notice", notice.id)
        .record(&state.pool)
        .await;
    ok(notice)
}

/// Broadcast notices have no single reader to attribute.
fn read_event(notice: &Notice) -> AuditEvent {
    let actor = notice
        .client_id
        .map(client_actor)
        .unwrap_or_else(|| "client".to_string());
    AuditEvent::new(actor, "notice.read", "notice", notice.id)
        .with_details(serde_json::json!({ "coach_id": notice.coach_id }))
}

async fn mark_read(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<Notice> {
    let notice = db::mark_notice_read(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("notice"))?;
    read_event(&notice).record(&state.pool).await;
    ok(notice)
}

async fn delete_notice(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<Uuid> {
    let notice = db::delete_notice(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("notice"))?;
    AuditEvent::new(coach_actor(notice.coach_id), "notice.delete", "notice", id)
        .record(&state.pool)
        .await;
    ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn notice(client_id: Option<Uuid>) -> Notice {
        Notice {
            id: Uuid::new_v4(),
            coach_id: Uuid::new_v4(),
            client_id,
            title: "Deload week".into(),
            body: "Keep sessions light.".into(),
            created_at: Utc::now(),
            read_at: Some(Utc::now()),
        }
    }

    #[test]
    fn read_is_attributed_to_the_client() {
        let client_id = Uuid::new_v4();
        let n = notice(Some(client_id));
        let event = read_event(&n);
        assert_eq!(event.actor, client_actor(client_id));
        assert_eq!(event.action, "notice.read");
        assert_eq!(event.resource_id, n.id.to_string());

        assert_eq!(read_event(&notice(None)).actor, "client");
    }
}

pub mod admin;
pub mod assignments;
pub mod clients;
pub mod emails;
pub mod error;
pub mod extract;
pub mod forms;
pub mod notices;
pub mod questions;
pub mod responses;

use crate::state::SharedState;
use axum::{routing::get, Router};

async fn health() -> &'static str {
    "OK"
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/clients", clients::router(state.clone()))
        .nest("/forms", forms::router(state.clone()))
        .nest("/questions", questions::router(state.clone()))
        .nest("/assignments", assignments::router(state.clone()))
        .nest("/responses", responses::router(state.clone()))
        .nest("/notices", notices::router(state.clone()))
        .nest("/emails", emails::router(state.clone()))
        .nest("/admin", admin::router(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::middleware::RateLimiter;
    use crate::services::notifications::LogMailer;
    use crate::state::AppState;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    // The pool never connects: every request below is answered before any query runs.
    fn app(submit_limit: usize) -> Router {
        let config = AppConfig::from_lookup(|name| match name {
            "DATABASE_URL" => Some("postgres://localhost/unused".to_string()),
            _ => None,
        })
        .unwrap();
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        let state: SharedState = Arc::new(AppState {
            pool,
            config: Arc::new(config),
            mailer: Arc::new(LogMailer),
            submit_limiter: RateLimiter::new(submit_limit, 60),
        });
        routes(state)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_plain_ok() {
        let response = app(10)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn assignment_week_count_is_validated() {
        let body = serde_json::json!({
            "client_id": Uuid::new_v4(),
            "form_id": Uuid::new_v4(),
            "due_date": "2026-03-02T17:00:00Z",
            "total_weeks": 0,
        });
        let response = app(10)
            .oneshot(json_request("POST", "/assignments", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "total_weeks must be between 1 and 52");
    }

    #[tokio::test]
    async fn empty_submission_rejected_then_rate_limited() {
        let app = app(1);
        let uri = format!("/assignments/{}/submit", Uuid::new_v4());
        let body = serde_json::json!({ "client_id": Uuid::new_v4(), "answers": [] });

        let first = app
            .clone()
            .oneshot(json_request("POST", &uri, body.clone()))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(first).await["message"], "no answers submitted");

        let second = app.oneshot(json_request("POST", &uri, body)).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn question_weight_out_of_range() {
        let body = serde_json::json!({
            "coach_id": Uuid::new_v4(),
            "text": "Energy?",
            "type": "scale",
            "question_weight": 11,
        });
        let response = app(10)
            .oneshot(json_request("POST", "/questions", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn questions_need_an_owner() {
        let body = serde_json::json!({ "text": "Sleep quality?", "type": "scale" });
        let response = app(10)
            .oneshot(json_request("POST", "/questions", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("coach_id"));
    }

    #[tokio::test]
    async fn notice_requires_title_and_body() {
        let body = serde_json::json!({ "coach_id": Uuid::new_v4(), "title": " ", "body": "hi" });
        let response = app(10)
            .oneshot(json_request("POST", "/notices", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_ids_are_rejected() {
        let response = app(10)
            .oneshot(Request::get("/clients/not-a-uuid").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("UUID"));

        let response = app(10)
            .oneshot(Request::get("/clients").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn malformed_json_uses_failure_envelope() {
        let request = Request::builder()
            .method("POST")
            .uri("/notices")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app(10).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["message"].is_string());
    }
}

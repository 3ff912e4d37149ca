use crate::domain::submission::SubmissionError;
use crate::services::checkins::SubmitError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    TooManyRequests(String),
    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Success envelope: `{ "success": true, "data": ... }`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse {
        success: true,
        data,
    }))
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{what} not found"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                "internal server error".to_string()
            }
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::TooManyRequests(msg) => msg,
        };

        (
            status,
            Json(ErrorBody {
                success: false,
                message,
            }),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        if let Some(db_err) = e.downcast_ref::<sqlx::Error>() {
            if let Some(conflict) = constraint_conflict(db_err) {
                return conflict;
            }
        }
        ApiError::Internal(format!("{e:#}"))
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        constraint_conflict(&e).unwrap_or_else(|| ApiError::Internal(e.to_string()))
    }
}

fn constraint_conflict(e: &sqlx::Error) -> Option<ApiError> {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => Some(ApiError::Conflict(
            "a record with the same unique fields already exists".to_string(),
        )),
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => Some(ApiError::Conflict(
            "the record is still referenced by other records".to_string(),
        )),
        _ => None,
    }
}

impl From<SubmissionError> for ApiError {
    fn from(e: SubmissionError) -> Self {
        match e {
            SubmissionError::AlreadyCompleted => ApiError::Conflict(e.to_string()),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::AssignmentNotFound => ApiError::not_found("assignment"),
            SubmitError::Invalid(inner) => inner.into(),
            SubmitError::Other(inner) => inner.into(),
        }
    }
}

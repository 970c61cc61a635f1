use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::application::RatingResult;
use crate::policy::PolicyError;
use crate::rating::RatingError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The request was understood but the pipeline could not produce a usable
    /// result. Carries the model output that caused it, when there is one.
    #[error("Unprocessable entity: {message}")]
    UnprocessableEntity {
        code: &'static str,
        message: String,
        raw_output: Option<String>,
        fallback: Option<RatingResult>,
    },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<PolicyError> for AppError {
    fn from(e: PolicyError) -> Self {
        let message = e.to_string();
        match e {
            PolicyError::JobNotFound(_) => AppError::NotFound(message),
            PolicyError::Persistence(db) => AppError::Database(db),
            PolicyError::InvalidSchedule(_)
            | PolicyError::UnknownKind(_)
            | PolicyError::InvalidStatus(_) => AppError::Validation(message),
        }
    }
}

impl From<RatingError> for AppError {
    fn from(e: RatingError) -> Self {
        let message = e.to_string();
        match e {
            RatingError::NotFound(_) => AppError::NotFound(message),
            RatingError::JobNotOpen(_) => AppError::Conflict(message),
            RatingError::Extraction(_) => AppError::UnprocessableEntity {
                code: "EXTRACTION_FAILED",
                message,
                raw_output: None,
                fallback: None,
            },
            RatingError::Structuring { raw, .. } => AppError::UnprocessableEntity {
                code: "STRUCTURING_FAILED",
                message,
                raw_output: Some(raw),
                fallback: None,
            },
            RatingError::Validation { raw, fallback, .. } => AppError::UnprocessableEntity {
                code: "RATING_INVALID",
                message,
                raw_output: Some(raw),
                fallback: Some(fallback),
            },
            RatingError::Persistence(db) => AppError::Database(db),
            RatingError::Timeout { .. } => AppError::Timeout(message),
            RatingError::Completion(_) => AppError::Llm(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, raw_output, fallback) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None, None),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg, None, None)
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg, None, None),
            AppError::UnprocessableEntity {
                code,
                message,
                raw_output,
                fallback,
            } => {
                tracing::warn!("{code}: {message}");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    code,
                    message,
                    raw_output,
                    fallback,
                )
            }
            AppError::Timeout(msg) => {
                tracing::warn!("Timeout: {msg}");
                (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", msg, None, None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    None,
                    None,
                )
            }
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "LLM_ERROR",
                    "An AI processing error occurred".to_string(),
                    None,
                    None,
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    None,
                    None,
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(raw) = raw_output {
            error["raw_output"] = json!(raw);
        }
        if let Some(fallback) = fallback {
            error["fallback"] = json!(fallback);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

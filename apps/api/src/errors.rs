use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::context::models::ContextError;
use crate::generation::dispatcher::{GenerationError, GenerationErrorKind};
use crate::performance::webhook::WebhookValidationError;

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

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Webhook(#[from] WebhookValidationError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Model error: {0}")]
    Model(String),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Context(ContextError::SourceUnavailable(e)) => {
                tracing::error!("Context source unavailable: {e:?}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "CONTEXT_UNAVAILABLE",
                    "Product catalog is temporarily unavailable".to_string(),
                )
            }
            AppError::Context(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "CONTEXT_ERROR",
                e.to_string(),
            ),
            AppError::Generation(e) => {
                let (status, code) = match e.kind() {
                    GenerationErrorKind::Quota => (StatusCode::TOO_MANY_REQUESTS, "QUOTA_EXCEEDED"),
                    GenerationErrorKind::Transient => {
                        (StatusCode::SERVICE_UNAVAILABLE, "GENERATION_UNAVAILABLE")
                    }
                    GenerationErrorKind::PolicyViolation => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "CONTENT_POLICY_VIOLATION")
                    }
                    GenerationErrorKind::Auth => (StatusCode::BAD_GATEWAY, "MODEL_AUTH_FAILED"),
                    GenerationErrorKind::PermanentUnknown => {
                        (StatusCode::BAD_GATEWAY, "GENERATION_FAILED")
                    }
                };
                (status, code, e.to_string())
            }
            AppError::Webhook(e) if e.is_authentication() => {
                (StatusCode::UNAUTHORIZED, "INVALID_SIGNATURE", e.to_string())
            }
            AppError::Webhook(e) => (StatusCode::BAD_REQUEST, "INVALID_WEBHOOK", e.to_string()),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Model(msg) => {
                tracing::error!("Model error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "MODEL_ERROR",
                    "The generative model could not process the request".to_string(),
                )
            }
            AppError::S3(msg) => {
                tracing::error!("S3 error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "S3_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use stampline_core::error::CoreError;
use stampline_pipeline::WorkflowError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`WorkflowError`] for engine failures and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce a consistent
/// `{ "error": { "code", "message" } }` body.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// An error from a workflow operation.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// A database error from a direct repository read.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A resource addressed by something other than an id.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        AppError::Workflow(err.into())
    }
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Workflow(err) => classify_workflow_error(err),
            AppError::Database(err) => classify_sqlx_error(err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": {
                "code": code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Map a workflow error to an HTTP status, error code, and message.
///
/// Local failures (storage, files, images, training) are logged and
/// reported with a sanitized message.
fn classify_workflow_error(err: &WorkflowError) -> (StatusCode, &'static str, String) {
    match err {
        WorkflowError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        WorkflowError::Validation(msg) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
        }
        WorkflowError::InvalidTransition { .. } => (
            StatusCode::CONFLICT,
            "INVALID_TRANSITION",
            err.to_string(),
        ),
        WorkflowError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        WorkflowError::ExternalService(_) | WorkflowError::Parse(_) => (
            StatusCode::BAD_GATEWAY,
            "EXTERNAL_SERVICE_ERROR",
            err.to_string(),
        ),
        WorkflowError::Storage(e) => classify_sqlx_error(e),
        WorkflowError::Training(_) | WorkflowError::Io(_) | WorkflowError::Image(_) => {
            tracing::error!(error = %err, kind = err.kind(), "Workflow operation failed");
            internal()
        }
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

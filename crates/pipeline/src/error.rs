//! Workflow error taxonomy.

use stampline_core::error::CoreError;
use stampline_core::generation::ClientError;
use stampline_core::training::TrainingError;
use stampline_core::types::DbId;

/// Errors raised by workflow operations and their background stages.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The referenced set or stamp does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// The action is not permitted in the set's current status.
    #[error("Cannot {action} while set is {from}")]
    InvalidTransition { action: String, from: String },

    /// Input rejected before any state was touched.
    #[error("{0}")]
    Validation(String),

    /// A generation service failed or timed out.
    #[error("External service failed: {0}")]
    ExternalService(#[from] ClientError),

    /// A generation service answered with nothing usable.
    #[error("Unusable service output: {0}")]
    Parse(String),

    /// Another task already owns the set.
    #[error("{0}")]
    Conflict(String),

    #[error("Training failed: {0}")]
    Training(#[from] TrainingError),

    #[error("Database error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl WorkflowError {
    pub fn set_not_found(id: DbId) -> Self {
        WorkflowError::NotFound {
            entity: "Stamp set",
            id,
        }
    }

    pub fn stamp_not_found(id: DbId) -> Self {
        WorkflowError::NotFound {
            entity: "Stamp",
            id,
        }
    }

    /// Short machine-readable kind, used in failure events.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::NotFound { .. } => "not_found",
            WorkflowError::InvalidTransition { .. } => "invalid_transition",
            WorkflowError::Validation(_) => "validation",
            WorkflowError::ExternalService(_) => "external_service",
            WorkflowError::Parse(_) => "parse",
            WorkflowError::Conflict(_) => "conflict",
            WorkflowError::Training(_) => "training",
            WorkflowError::Storage(_) => "storage",
            WorkflowError::Io(_) => "io",
            WorkflowError::Image(_) => "image",
        }
    }
}

impl From<CoreError> for WorkflowError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { entity, id } => WorkflowError::NotFound { entity, id },
            CoreError::Validation(msg) => WorkflowError::Validation(msg),
            CoreError::InvalidTransition { action, from } => {
                WorkflowError::InvalidTransition { action, from }
            }
            CoreError::Conflict(msg) => WorkflowError::Conflict(msg),
            CoreError::Internal(msg) => WorkflowError::Validation(msg),
        }
    }
}

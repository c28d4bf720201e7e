//! Error taxonomy shared by the workflow services.

use crate::interfaces::storage_adapter::StorageError;

/// Result type for workflow and roster operations.
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Errors surfaced to callers of the workflow services.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Database not connected")]
    NotConnected,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Cannot {action} leave {id} in status '{from}'")]
    IllegalTransition {
        id: i64,
        from: String,
        action: &'static str,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl WorkflowError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        WorkflowError::Validation(message.into())
    }
}

impl From<StorageError> for WorkflowError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotConnected => WorkflowError::NotConnected,
            e if e.is_unique_violation() => WorkflowError::Conflict(e.to_string()),
            e => WorkflowError::Storage(e),
        }
    }
}

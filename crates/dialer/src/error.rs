//! Error types for engine operations.

use database::DatabaseError;
use thiserror::Error;

/// Errors that can occur during admission, dispatch, or result recording.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown tenant or number.
    #[error("not found: {0}")]
    NotFound(String),

    /// Actor acting outside their ownership (agent touching a number not
    /// reserved to them). Surfaced verbatim, never downgraded to NotFound.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Mutation of a number in a terminal status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed request parameters.
    #[error("validation error: {0}")]
    Validation(String),

    /// Underlying store failure.
    #[error("database error: {0}")]
    Database(DatabaseError),
}

impl From<DatabaseError> for EngineError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity, id } => {
                EngineError::NotFound(format!("{entity} {id}"))
            }
            other => EngineError::Database(other),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

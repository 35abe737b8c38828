use database::DatabaseError;
use thiserror::Error;

use crate::jalali::JalaliError;

/// Wallet service errors.
#[derive(Debug, Error)]
pub enum WalletError {
    /// Tenant or referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rejected input: bad amounts, malformed claim dates.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No stored bank SMS satisfies the claim.
    #[error("no matching bank sms: {0}")]
    NoMatch(String),

    /// More than one stored SMS satisfies the claim; refusing to guess.
    #[error("ambiguous match: {candidates} candidate messages")]
    AmbiguousMatch { candidates: usize },

    /// Underlying storage failure.
    #[error("database error: {0}")]
    Database(DatabaseError),
}

impl From<DatabaseError> for WalletError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity, id } => {
                WalletError::NotFound(format!("{entity} {id}"))
            }
            other => WalletError::Database(other),
        }
    }
}

impl From<JalaliError> for WalletError {
    fn from(err: JalaliError) -> Self {
        WalletError::Validation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WalletError>;

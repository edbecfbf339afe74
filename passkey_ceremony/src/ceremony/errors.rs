use thiserror::Error;

use crate::utils::UtilError;

/// Errors raised by a [`CeremonyLedger`](super::CeremonyLedger).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    /// Unknown, expired, or already consumed ceremony token
    #[error("Ceremony not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Utils error: {0}")]
    Utils(#[from] UtilError),
}

impl From<redis::RedisError> for LedgerError {
    fn from(err: redis::RedisError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("Json conversion(Serde) error: {err}"))
    }
}

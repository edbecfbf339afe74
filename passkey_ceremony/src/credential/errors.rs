use thiserror::Error;

use crate::utils::UtilError;

/// Errors raised by a [`CredentialStore`](super::CredentialStore).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CredentialStoreError {
    /// A credential with the same id is already registered, for any user
    #[error("Duplicate credential: {0}")]
    DuplicateCredential(String),

    /// The referenced user or credential does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend failure (database, connection, decoding)
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Utils error: {0}")]
    Utils(#[from] UtilError),
}

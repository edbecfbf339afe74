//! Error types returned by the ceremony orchestrator

use thiserror::Error;

use crate::ceremony::LedgerError;
use crate::credential::{CredentialId, CredentialStoreError};
use crate::utils::UtilError;

/// Every way a ceremony operation can fail. All variants are terminal for the
/// ceremony: nothing is retried internally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CeremonyError {
    /// Unknown, expired, or already consumed token. The client must start over.
    #[error("Ceremony not found")]
    CeremonyNotFound,

    /// The response does not belong to the ceremony it was submitted for
    #[error("Ceremony mismatch: {0}")]
    CeremonyMismatch(String),

    #[error("Duplicate credential: {0}")]
    DuplicateCredential(String),

    #[error("Registration rejected: {0}")]
    RegistrationRejected(String),

    #[error("Authentication rejected: {0}")]
    AuthenticationRejected(String),

    /// Verification passed but the counter did not advance: possible cloned authenticator
    #[error(
        "Sign count anomaly for credential {credential_id}: stored {stored}, reported {reported}"
    )]
    SignCountAnomaly {
        credential_id: CredentialId,
        stored: u32,
        reported: u32,
    },

    /// A record the ceremony depends on is missing from the store
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Verification engine error: {0}")]
    Engine(String),
}

impl CeremonyError {
    /// Whether operators should be alerted, as opposed to an ordinary failure.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            Self::CeremonyMismatch(_) | Self::SignCountAnomaly { .. }
        )
    }

    pub fn log(self) -> Self {
        match &self {
            Self::CeremonyNotFound => tracing::warn!("Ceremony not found"),
            Self::CeremonyMismatch(msg) => {
                tracing::error!(security_event = true, "Ceremony mismatch: {}", msg)
            }
            Self::DuplicateCredential(id) => tracing::warn!("Duplicate credential: {}", id),
            Self::RegistrationRejected(reason) => {
                tracing::warn!("Registration rejected: {}", reason)
            }
            Self::AuthenticationRejected(reason) => {
                tracing::warn!("Authentication rejected: {}", reason)
            }
            Self::SignCountAnomaly {
                credential_id,
                stored,
                reported,
            } => tracing::error!(
                security_event = true,
                %credential_id,
                stored,
                reported,
                "Sign count anomaly, possible cloned authenticator"
            ),
            Self::NotFound(what) => {
                tracing::error!("Store consistency violation, not found: {}", what)
            }
            Self::Storage(msg) => tracing::error!("Storage error: {}", msg),
            Self::Engine(msg) => tracing::error!("Verification engine error: {}", msg),
        }
        self
    }
}

impl From<CredentialStoreError> for CeremonyError {
    fn from(err: CredentialStoreError) -> Self {
        match err {
            CredentialStoreError::DuplicateCredential(id) => Self::DuplicateCredential(id),
            CredentialStoreError::NotFound(what) => Self::NotFound(what),
            CredentialStoreError::Storage(msg) => Self::Storage(msg),
            CredentialStoreError::Utils(e) => Self::Storage(e.to_string()),
        }
    }
}

impl From<LedgerError> for CeremonyError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(_) => Self::CeremonyNotFound,
            LedgerError::Storage(msg) => Self::Storage(msg),
            LedgerError::Utils(e) => Self::Storage(e.to_string()),
        }
    }
}

impl From<UtilError> for CeremonyError {
    fn from(err: UtilError) -> Self {
        Self::Storage(err.to_string())
    }
}

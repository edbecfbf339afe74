use thiserror::Error;

/// Failure reported by a [`VerificationEngine`](super::VerificationEngine).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VerificationError {
    /// The client response failed verification; the reason is passed on verbatim
    #[error("Verification rejected: {0}")]
    Rejected(String),

    /// The engine itself failed (misconfiguration, unreadable input)
    #[error("Verification engine error: {0}")]
    Engine(String),
}

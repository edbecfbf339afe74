use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ceremony::{Challenge, PendingCeremony};
use crate::config::CeremonyOptions;
use crate::credential::{CredentialId, UserHandle};
use crate::repository::CredentialRepository;

use super::errors::VerificationError;

/// The user a registration challenge is issued for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEntity {
    pub id: UserHandle,
    pub name: String,
    pub display_name: String,
}

/// A challenge minted by the engine together with the options document the
/// client needs to answer it.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedChallenge {
    pub challenge: Challenge,
    pub options: serde_json::Value,
}

/// Client answer to a challenge, as relayed by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientResponse {
    /// Credential the client used or created
    pub credential_id: CredentialId,
    /// User handle reported by the authenticator, present for discoverable credentials
    pub user_handle: Option<UserHandle>,
    /// Remaining protocol payload, opaque to this crate
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationOutcome {
    pub credential_id: CredentialId,
    pub public_key: Vec<u8>,
    pub sign_count: u32,
    pub aaguid: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticationOutcome {
    pub credential_id: CredentialId,
    pub sign_count: u32,
    pub success: bool,
}

/// WebAuthn protocol engine: challenge construction and cryptographic
/// verification of client responses.
///
/// The orchestrator treats the engine as a trusted oracle. Relying-party
/// identity and accepted origins are the engine's own configuration.
#[async_trait]
pub trait VerificationEngine: Send + Sync + 'static {
    async fn start_registration(
        &self,
        user: &UserEntity,
        exclude_credentials: &[CredentialId],
        options: &CeremonyOptions,
    ) -> Result<IssuedChallenge, VerificationError>;

    /// `allow_credentials` is empty for discoverable-credential authentication
    /// and for usernames without credentials.
    async fn start_authentication(
        &self,
        allow_credentials: &[CredentialId],
        options: &CeremonyOptions,
    ) -> Result<IssuedChallenge, VerificationError>;

    async fn finish_registration(
        &self,
        ceremony: &PendingCeremony,
        response: &ClientResponse,
        repository: &CredentialRepository,
    ) -> Result<RegistrationOutcome, VerificationError>;

    async fn finish_authentication(
        &self,
        ceremony: &PendingCeremony,
        response: &ClientResponse,
        repository: &CredentialRepository,
    ) -> Result<AuthenticationOutcome, VerificationError>;
}

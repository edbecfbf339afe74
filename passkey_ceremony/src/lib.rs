//! passkey_ceremony - ceremony state management for passkey relying parties
//!
//! Issues registration and authentication ceremonies, correlates client
//! responses to the one pending ceremony they were issued for, and keeps the
//! credential state (public key, signature counter, owner) that later
//! authentications are checked against. Cryptographic verification is
//! delegated to a [`VerificationEngine`].

mod ceremony;
mod config;
mod coordination;
mod credential;
mod repository;
mod utils;
mod verification;


use std::sync::Arc;

pub use ceremony::{
    CeremonyKind, CeremonyLedger, CeremonyToken, Challenge, Clock, InMemoryCeremonyLedger,
    LedgerError, ManualClock, PendingCeremony, RedisCeremonyLedger, SystemClock,
    ceremony_ledger_from_env,
};

pub use config::{
    AttachmentPreference, CeremonyConfig, CeremonyOptions, ConfigError, RelyingPartyConfig,
    ResidentKey, UserVerification, apk_key_hash_origin,
};

pub use coordination::{CeremonyChallenge, CeremonyError, CeremonyOrchestrator};

pub use credential::{
    Authenticator, CredentialId, CredentialStore, CredentialStoreError, InMemoryCredentialStore,
    SqliteCredentialStore, User, UserHandle, UserSummary, credential_store_from_env,
};

pub use repository::{CredentialRepository, RegisteredCredential};

pub use utils::UtilError;

pub use verification::{
    AuthenticationOutcome, ClientResponse, IssuedChallenge, RegistrationOutcome, UserEntity,
    VerificationEngine, VerificationError,
};

/// Build an orchestrator from environment configuration.
///
/// Selects and initializes the credential store and ceremony ledger backends
/// (see [`credential_store_from_env`] and [`ceremony_ledger_from_env`]) and
/// wires them to `engine` with the system clock.
pub async fn init(
    engine: Arc<dyn VerificationEngine>,
) -> Result<CeremonyOrchestrator, Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = credential_store_from_env().await?;
    let ledger = ceremony_ledger_from_env(Arc::clone(&clock)).await?;

    Ok(CeremonyOrchestrator::new(
        store,
        ledger,
        engine,
        clock,
        CeremonyConfig::from_env(),
    ))
}

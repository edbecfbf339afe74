use serde::Serialize;
use std::sync::Arc;

use crate::ceremony::{CeremonyKind, CeremonyLedger, CeremonyToken, Clock, PendingCeremony};
use crate::config::CeremonyConfig;
use crate::credential::CredentialStore;
use crate::repository::CredentialRepository;
use crate::verification::VerificationEngine;

use super::errors::CeremonyError;

/// What `begin_*` hands back to the gateway: the token the client must echo
/// and the options it needs to talk to its authenticator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CeremonyChallenge {
    pub token: CeremonyToken,
    pub options: serde_json::Value,
}

/// Drives registration and authentication ceremonies.
///
/// Holds no state of its own: users and authenticators live in the
/// [`CredentialStore`], in-flight ceremonies in the [`CeremonyLedger`], and
/// cryptographic checks are delegated to the [`VerificationEngine`].
#[derive(Clone)]
pub struct CeremonyOrchestrator {
    pub(super) store: Arc<dyn CredentialStore>,
    pub(super) ledger: Arc<dyn CeremonyLedger>,
    pub(super) engine: Arc<dyn VerificationEngine>,
    pub(super) repository: CredentialRepository,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) config: CeremonyConfig,
}

impl CeremonyOrchestrator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        ledger: Arc<dyn CeremonyLedger>,
        engine: Arc<dyn VerificationEngine>,
        clock: Arc<dyn Clock>,
        config: CeremonyConfig,
    ) -> Self {
        Self {
            repository: CredentialRepository::new(Arc::clone(&store)),
            store,
            ledger,
            engine,
            clock,
            config,
        }
    }

    pub fn repository(&self) -> &CredentialRepository {
        &self.repository
    }

    pub fn config(&self) -> &CeremonyConfig {
        &self.config
    }

    /// Consume `token` and check that it was opened for `expected`.
    ///
    /// The ledger entry is gone after this call whatever the outcome, so a
    /// retry always needs a new ceremony.
    pub(super) async fn take_ceremony(
        &self,
        token: &CeremonyToken,
        expected: CeremonyKind,
    ) -> Result<PendingCeremony, CeremonyError> {
        let ceremony = self
            .ledger
            .consume(token)
            .await
            .map_err(|e| CeremonyError::from(e).log())?;

        if ceremony.kind != expected {
            return Err(CeremonyError::CeremonyMismatch(format!(
                "{} ceremony finished as {}",
                ceremony.kind, expected
            ))
            .log());
        }

        Ok(ceremony)
    }
}

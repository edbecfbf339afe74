use crate::ceremony::{CeremonyKind, CeremonyToken, PendingCeremony};
use crate::credential::{Authenticator, CredentialId, User};
use crate::verification::ClientResponse;

use super::errors::CeremonyError;
use super::orchestrator::{CeremonyChallenge, CeremonyOrchestrator};
use super::registration::engine_failure;

/// Outcome of comparing a reported signature counter with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignCountCheck {
    /// Neither side keeps a counter
    Unsupported,
    /// The counter moved forward
    Advanced,
    /// The counter stalled or went backwards
    Anomaly,
}

pub(crate) fn check_sign_count(stored: u32, reported: u32) -> SignCountCheck {
    if stored == 0 && reported == 0 {
        SignCountCheck::Unsupported
    } else if reported > stored {
        SignCountCheck::Advanced
    } else {
        SignCountCheck::Anomaly
    }
}

impl CeremonyOrchestrator {
    /// Start an authentication ceremony.
    ///
    /// With a username the challenge lists that user's credentials; an
    /// unknown username yields the same empty list as a user without
    /// credentials. Without a username the client picks a discoverable
    /// credential itself.
    pub async fn begin_authentication(
        &self,
        username: Option<&str>,
    ) -> Result<CeremonyChallenge, CeremonyError> {
        let allow_credentials = match username {
            Some(username) => self
                .repository
                .credential_descriptors_for(username)
                .await
                .map_err(|e| CeremonyError::from(e).log())?,
            None => Vec::new(),
        };

        let issued = self
            .engine
            .start_authentication(&allow_credentials, &self.config.options)
            .await
            .map_err(|e| engine_failure(e, CeremonyError::AuthenticationRejected))?;

        let token = self
            .ledger
            .open(
                CeremonyKind::Authentication,
                issued.challenge,
                username.map(str::to_string),
                self.config.challenge_ttl,
            )
            .await
            .map_err(|e| CeremonyError::from(e).log())?;

        tracing::info!(
            username = username.unwrap_or("<discoverable>"),
            allowed = allow_credentials.len(),
            "Authentication ceremony started"
        );

        Ok(CeremonyChallenge {
            token,
            options: issued.options,
        })
    }

    /// Verify the client's assertion and return the authenticated user.
    pub async fn finish_authentication(
        &self,
        token: &CeremonyToken,
        response: &ClientResponse,
    ) -> Result<User, CeremonyError> {
        let ceremony = self
            .take_ceremony(token, CeremonyKind::Authentication)
            .await?;

        if let Some(username) = ceremony.bound_username.as_deref() {
            self.ensure_owned_by(&response.credential_id, username)
                .await?;
        }

        let outcome = self
            .engine
            .finish_authentication(&ceremony, response, &self.repository)
            .await
            .map_err(|e| engine_failure(e, CeremonyError::AuthenticationRejected))?;

        if !outcome.success {
            return Err(CeremonyError::AuthenticationRejected(
                "verification reported failure".to_string(),
            )
            .log());
        }
        if outcome.credential_id != response.credential_id {
            return Err(CeremonyError::CeremonyMismatch(format!(
                "response names credential {} but {} was verified",
                response.credential_id, outcome.credential_id
            ))
            .log());
        }

        let authenticator = self
            .store
            .find_authenticator(&outcome.credential_id)
            .await
            .map_err(|e| CeremonyError::from(e).log())?
            .ok_or_else(|| {
                CeremonyError::NotFound(format!("credential {}", outcome.credential_id)).log()
            })?;

        self.apply_sign_count(&authenticator, outcome.sign_count)
            .await?;

        let user = self
            .store
            .find_by_id(&authenticator.owner)
            .await
            .map_err(|e| CeremonyError::from(e).log())?
            .ok_or_else(|| CeremonyError::NotFound(format!("user {}", authenticator.owner)).log())?;

        log_finished(&ceremony, &user, &authenticator);
        Ok(user)
    }

    /// Reject a response for a credential owned by someone other than the
    /// ceremony's bound user. Unknown credentials are left to the engine.
    async fn ensure_owned_by(
        &self,
        credential_id: &CredentialId,
        username: &str,
    ) -> Result<(), CeremonyError> {
        let Some(authenticator) = self
            .store
            .find_authenticator(credential_id)
            .await
            .map_err(|e| CeremonyError::from(e).log())?
        else {
            return Ok(());
        };

        let owner = self
            .store
            .find_by_id(&authenticator.owner)
            .await
            .map_err(|e| CeremonyError::from(e).log())?;

        match owner {
            Some(owner) if owner.username == username => Ok(()),
            _ => Err(CeremonyError::CeremonyMismatch(format!(
                "credential {credential_id} is not owned by {username}"
            ))
            .log()),
        }
    }

    async fn apply_sign_count(
        &self,
        authenticator: &Authenticator,
        reported: u32,
    ) -> Result<(), CeremonyError> {
        let stored = authenticator.sign_count;
        tracing::debug!(
            "Counter verification - stored: {}, received: {}",
            stored,
            reported
        );

        if check_sign_count(stored, reported) == SignCountCheck::Anomaly {
            return Err(sign_count_anomaly(authenticator, stored, reported));
        }

        // Counterless authenticators write 0 over 0, only the last-use time moves
        let advanced = self
            .store
            .advance_sign_count(
                &authenticator.credential_id,
                stored,
                reported,
                self.clock.now(),
            )
            .await
            .map_err(|e| CeremonyError::from(e).log())?;
        if advanced {
            return Ok(());
        }

        // Another authentication moved the counter since it was read
        let current = self
            .store
            .find_authenticator(&authenticator.credential_id)
            .await
            .map_err(|e| CeremonyError::from(e).log())?
            .map_or(stored, |a| a.sign_count);
        Err(sign_count_anomaly(authenticator, current, reported))
    }
}

fn sign_count_anomaly(authenticator: &Authenticator, stored: u32, reported: u32) -> CeremonyError {
    CeremonyError::SignCountAnomaly {
        credential_id: authenticator.credential_id.clone(),
        stored,
        reported,
    }
    .log()
}

fn log_finished(ceremony: &PendingCeremony, user: &User, authenticator: &Authenticator) {
    tracing::info!(
        username = %user.username,
        credential_id = %authenticator.credential_id,
        discoverable = ceremony.bound_username.is_none(),
        "Authentication ceremony finished"
    );
}

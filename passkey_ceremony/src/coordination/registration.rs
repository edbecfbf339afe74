use crate::ceremony::{CeremonyKind, CeremonyToken};
use crate::credential::Authenticator;
use crate::verification::{ClientResponse, UserEntity, VerificationError};

use super::errors::CeremonyError;
use super::orchestrator::{CeremonyChallenge, CeremonyOrchestrator};

impl CeremonyOrchestrator {
    /// Start registering a new authenticator for `username`, creating the
    /// user on first use.
    pub async fn begin_registration(
        &self,
        username: &str,
        display_name: &str,
    ) -> Result<CeremonyChallenge, CeremonyError> {
        let user = self
            .store
            .upsert_user(username, display_name)
            .await
            .map_err(|e| CeremonyError::from(e).log())?;

        let exclude_credentials: Vec<_> = self
            .store
            .list_authenticators(&user.id)
            .await
            .map_err(|e| CeremonyError::from(e).log())?
            .into_iter()
            .map(|authenticator| authenticator.credential_id)
            .collect();

        let entity = UserEntity {
            id: user.id.clone(),
            name: user.username.clone(),
            display_name: user.display_name.clone(),
        };
        let issued = self
            .engine
            .start_registration(&entity, &exclude_credentials, &self.config.options)
            .await
            .map_err(|e| engine_failure(e, CeremonyError::RegistrationRejected))?;

        let token = self
            .ledger
            .open(
                CeremonyKind::Registration,
                issued.challenge,
                Some(user.username.clone()),
                self.config.challenge_ttl,
            )
            .await
            .map_err(|e| CeremonyError::from(e).log())?;

        tracing::info!(
            username,
            user_id = %user.id,
            excluded = exclude_credentials.len(),
            "Registration ceremony started"
        );

        Ok(CeremonyChallenge {
            token,
            options: issued.options,
        })
    }

    /// Verify the client's attestation and record the new authenticator.
    ///
    /// `name` is an optional device label stored with the credential.
    pub async fn finish_registration(
        &self,
        token: &CeremonyToken,
        response: &ClientResponse,
        name: Option<String>,
    ) -> Result<Authenticator, CeremonyError> {
        let ceremony = self
            .take_ceremony(token, CeremonyKind::Registration)
            .await?;

        let Some(username) = ceremony.bound_username.as_deref() else {
            return Err(
                CeremonyError::CeremonyMismatch("registration without a user".to_string()).log(),
            );
        };
        let user = self
            .store
            .find_by_username(username)
            .await
            .map_err(|e| CeremonyError::from(e).log())?
            .ok_or_else(|| CeremonyError::NotFound(format!("user {username}")).log())?;

        let outcome = self
            .engine
            .finish_registration(&ceremony, response, &self.repository)
            .await
            .map_err(|e| engine_failure(e, CeremonyError::RegistrationRejected))?;

        let now = self.clock.now();
        let authenticator = Authenticator {
            credential_id: outcome.credential_id,
            owner: user.id.clone(),
            public_key: outcome.public_key,
            sign_count: outcome.sign_count,
            aaguid: outcome.aaguid,
            name,
            created_at: now,
            last_used_at: now,
        };

        self.store
            .attach_authenticator(authenticator.clone())
            .await
            .map_err(|e| CeremonyError::from(e).log())?;

        tracing::info!(
            username,
            credential_id = %authenticator.credential_id,
            sign_count = authenticator.sign_count,
            "Registration ceremony finished"
        );
        Ok(authenticator)
    }
}

/// Map an engine failure, using `rejected` for a declined response.
pub(super) fn engine_failure(
    err: VerificationError,
    rejected: fn(String) -> CeremonyError,
) -> CeremonyError {
    match err {
        VerificationError::Rejected(reason) => rejected(reason),
        VerificationError::Engine(msg) => CeremonyError::Engine(msg),
    }
    .log()
}

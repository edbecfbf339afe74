use crate::credential::{Authenticator, UserSummary};

use super::errors::CeremonyError;
use super::orchestrator::CeremonyOrchestrator;

impl CeremonyOrchestrator {
    /// Summaries of all registered users, oldest first.
    pub async fn list_users(&self) -> Result<Vec<UserSummary>, CeremonyError> {
        self.store
            .list_users()
            .await
            .map_err(|e| CeremonyError::from(e).log())
    }

    /// Authenticators registered to `username`, empty for an unknown user.
    pub async fn list_credentials(
        &self,
        username: &str,
    ) -> Result<Vec<Authenticator>, CeremonyError> {
        let Some(user) = self
            .store
            .find_by_username(username)
            .await
            .map_err(|e| CeremonyError::from(e).log())?
        else {
            return Ok(Vec::new());
        };

        self.store
            .list_authenticators(&user.id)
            .await
            .map_err(|e| CeremonyError::from(e).log())
    }
}

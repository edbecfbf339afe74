use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::credential::errors::CredentialStoreError;
use crate::credential::types::{Authenticator, CredentialId, User, UserHandle, UserSummary};

use super::types::{CredentialStore, InMemoryCredentialStore, MemoryState};

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        tracing::info!("Creating new in-memory credential store");
        Self {
            state: Mutex::new(MemoryState::default()),
        }
    }
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn init(&self) -> Result<(), CredentialStoreError> {
        Ok(()) // Nothing to initialize for in-memory store
    }

    async fn upsert_user(
        &self,
        username: &str,
        display_name: &str,
    ) -> Result<User, CredentialStoreError> {
        let mut state = self.state.lock().await;

        if let Some(id) = state.id_by_username.get(username) {
            if let Some(user) = state.users_by_id.get(id) {
                return Ok(user.clone());
            }
        }

        let mut id = UserHandle::generate()?;
        while state.users_by_id.contains_key(&id) {
            tracing::warn!("User handle collision, regenerating");
            id = UserHandle::generate()?;
        }

        let user = User {
            id: id.clone(),
            username: username.to_string(),
            display_name: display_name.to_string(),
            created_at: Utc::now(),
        };

        state.id_by_username.insert(username.to_string(), id.clone());
        state.users_by_id.insert(id.clone(), user.clone());
        state.owned.insert(id, Vec::new());

        tracing::info!(username, user_id = %user.id, "Created user");
        Ok(user)
    }

    async fn attach_authenticator(
        &self,
        authenticator: Authenticator,
    ) -> Result<(), CredentialStoreError> {
        let mut state = self.state.lock().await;

        if state
            .authenticators
            .contains_key(&authenticator.credential_id)
        {
            return Err(CredentialStoreError::DuplicateCredential(
                authenticator.credential_id.to_string(),
            ));
        }

        let Some(owned) = state.owned.get_mut(&authenticator.owner) else {
            return Err(CredentialStoreError::NotFound(format!(
                "user {}",
                authenticator.owner
            )));
        };
        owned.push(authenticator.credential_id.clone());

        tracing::info!(
            credential_id = %authenticator.credential_id,
            user_id = %authenticator.owner,
            "Attached authenticator"
        );
        state
            .authenticators
            .insert(authenticator.credential_id.clone(), authenticator);
        Ok(())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, CredentialStoreError> {
        let state = self.state.lock().await;
        Ok(state
            .id_by_username
            .get(username)
            .and_then(|id| state.users_by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, user_id: &UserHandle) -> Result<Option<User>, CredentialStoreError> {
        let state = self.state.lock().await;
        Ok(state.users_by_id.get(user_id).cloned())
    }

    async fn find_authenticator(
        &self,
        credential_id: &CredentialId,
    ) -> Result<Option<Authenticator>, CredentialStoreError> {
        let state = self.state.lock().await;
        Ok(state.authenticators.get(credential_id).cloned())
    }

    async fn list_authenticators(
        &self,
        user_id: &UserHandle,
    ) -> Result<Vec<Authenticator>, CredentialStoreError> {
        let state = self.state.lock().await;
        let Some(owned) = state.owned.get(user_id) else {
            return Ok(Vec::new());
        };

        Ok(owned
            .iter()
            .filter_map(|credential_id| state.authenticators.get(credential_id))
            .cloned()
            .collect())
    }

    async fn update_sign_count(
        &self,
        credential_id: &CredentialId,
        sign_count: u32,
        used_at: DateTime<Utc>,
    ) -> Result<(), CredentialStoreError> {
        let mut state = self.state.lock().await;
        let Some(authenticator) = state.authenticators.get_mut(credential_id) else {
            return Err(CredentialStoreError::NotFound(format!(
                "credential {credential_id}"
            )));
        };

        authenticator.sign_count = sign_count;
        authenticator.last_used_at = used_at;
        Ok(())
    }

    async fn advance_sign_count(
        &self,
        credential_id: &CredentialId,
        expected: u32,
        sign_count: u32,
        used_at: DateTime<Utc>,
    ) -> Result<bool, CredentialStoreError> {
        let mut state = self.state.lock().await;
        let Some(authenticator) = state.authenticators.get_mut(credential_id) else {
            return Err(CredentialStoreError::NotFound(format!(
                "credential {credential_id}"
            )));
        };

        if authenticator.sign_count != expected {
            return Ok(false);
        }
        authenticator.sign_count = sign_count;
        authenticator.last_used_at = used_at;
        Ok(true)
    }

    async fn list_users(&self) -> Result<Vec<UserSummary>, CredentialStoreError> {
        let state = self.state.lock().await;
        let mut summaries: Vec<UserSummary> = state
            .users_by_id
            .values()
            .map(|user| UserSummary {
                user_id: user.id.clone(),
                username: user.username.clone(),
                display_name: user.display_name.clone(),
                authenticator_count: state.owned.get(&user.id).map_or(0, Vec::len),
                created_at: user.created_at,
            })
            .collect();

        summaries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.username.cmp(&b.username))
        });
        Ok(summaries)
    }
}

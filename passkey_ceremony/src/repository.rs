//! Read-only view of the credential store in the shape a verification engine
//! needs for its own checks.

use std::sync::Arc;

use crate::credential::{CredentialId, CredentialStore, CredentialStoreError, UserHandle};

/// Key material and counter of a credential, as seen by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredCredential {
    pub credential_id: CredentialId,
    pub user_handle: UserHandle,
    pub public_key: Vec<u8>,
    pub sign_count: u32,
}

#[derive(Clone)]
pub struct CredentialRepository {
    store: Arc<dyn CredentialStore>,
}

impl CredentialRepository {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Ids of the credentials owned by `username`; empty when the user is unknown.
    pub async fn credential_descriptors_for(
        &self,
        username: &str,
    ) -> Result<Vec<CredentialId>, CredentialStoreError> {
        let Some(user) = self.store.find_by_username(username).await? else {
            tracing::debug!(username, "No such user, returning no credential descriptors");
            return Ok(Vec::new());
        };

        Ok(self
            .store
            .list_authenticators(&user.id)
            .await?
            .into_iter()
            .map(|authenticator| authenticator.credential_id)
            .collect())
    }

    pub async fn user_handle_for(
        &self,
        username: &str,
    ) -> Result<Option<UserHandle>, CredentialStoreError> {
        Ok(self
            .store
            .find_by_username(username)
            .await?
            .map(|user| user.id))
    }

    pub async fn username_for(
        &self,
        user_handle: &UserHandle,
    ) -> Result<Option<String>, CredentialStoreError> {
        Ok(self
            .store
            .find_by_id(user_handle)
            .await?
            .map(|user| user.username))
    }

    /// The credential `credential_id`, but only if it belongs to `expected_user_handle`.
    pub async fn registered_credential(
        &self,
        credential_id: &CredentialId,
        expected_user_handle: &UserHandle,
    ) -> Result<Option<RegisteredCredential>, CredentialStoreError> {
        let Some(authenticator) = self.store.find_authenticator(credential_id).await? else {
            return Ok(None);
        };

        if &authenticator.owner != expected_user_handle {
            tracing::warn!(
                credential_id = %credential_id,
                "Credential presented under a user handle that does not own it"
            );
            return Ok(None);
        }

        Ok(Some(RegisteredCredential {
            credential_id: authenticator.credential_id,
            user_handle: authenticator.owner,
            public_key: authenticator.public_key,
            sign_count: authenticator.sign_count,
        }))
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::credential::errors::CredentialStoreError;
use crate::credential::types::{Authenticator, CredentialId, User, UserHandle, UserSummary};

/// Persistent record of users and the authenticators they own.
///
/// Implementations are shared behind an `Arc` and must serialize conflicting
/// writes themselves. Every returned value is an owned snapshot.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Prepare the backend (create tables and so on). Safe to call repeatedly.
    async fn init(&self) -> Result<(), CredentialStoreError>;

    /// Return the user named `username`, creating it with a fresh random
    /// handle if absent. An existing user keeps its handle and display name.
    async fn upsert_user(
        &self,
        username: &str,
        display_name: &str,
    ) -> Result<User, CredentialStoreError>;

    /// Register a new authenticator for the user identified by `authenticator.owner`.
    ///
    /// Fails with `DuplicateCredential` if the credential id is already
    /// registered for any user, and with `NotFound` if the owner is unknown.
    async fn attach_authenticator(
        &self,
        authenticator: Authenticator,
    ) -> Result<(), CredentialStoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, CredentialStoreError>;

    async fn find_by_id(&self, user_id: &UserHandle) -> Result<Option<User>, CredentialStoreError>;

    async fn find_authenticator(
        &self,
        credential_id: &CredentialId,
    ) -> Result<Option<Authenticator>, CredentialStoreError>;

    /// Authenticators owned by `user_id`, oldest first. Empty for unknown users.
    async fn list_authenticators(
        &self,
        user_id: &UserHandle,
    ) -> Result<Vec<Authenticator>, CredentialStoreError>;

    /// Overwrite the stored counter and last-use time.
    ///
    /// The monotonicity decision belongs to the caller; this method only
    /// records the value it is given.
    async fn update_sign_count(
        &self,
        credential_id: &CredentialId,
        sign_count: u32,
        used_at: DateTime<Utc>,
    ) -> Result<(), CredentialStoreError>;

    /// Record `sign_count` only if the stored counter still equals `expected`.
    ///
    /// Returns `false` when another writer changed the counter first. The
    /// comparison and the write happen as one step.
    async fn advance_sign_count(
        &self,
        credential_id: &CredentialId,
        expected: u32,
        sign_count: u32,
        used_at: DateTime<Utc>,
    ) -> Result<bool, CredentialStoreError>;

    /// Summaries of every user, oldest first.
    async fn list_users(&self) -> Result<Vec<UserSummary>, CredentialStoreError>;
}

#[derive(Default)]
pub(super) struct MemoryState {
    pub(super) users_by_id: HashMap<UserHandle, User>,
    pub(super) id_by_username: HashMap<String, UserHandle>,
    pub(super) authenticators: HashMap<CredentialId, Authenticator>,
    /// Owner index: credential ids per user in registration order
    pub(super) owned: HashMap<UserHandle, Vec<CredentialId>>,
}

/// Credential store kept entirely in process memory.
pub struct InMemoryCredentialStore {
    pub(super) state: Mutex<MemoryState>,
}

/// Credential store backed by an SQLite database.
pub struct SqliteCredentialStore {
    pub(super) pool: Pool<Sqlite>,
}

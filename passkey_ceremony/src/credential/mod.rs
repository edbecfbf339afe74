mod errors;
mod storage;
mod types;

pub use errors::CredentialStoreError;
pub use storage::{
    CredentialStore, InMemoryCredentialStore, SqliteCredentialStore, credential_store_from_env,
};
pub use types::{Authenticator, CredentialId, User, UserHandle, UserSummary};

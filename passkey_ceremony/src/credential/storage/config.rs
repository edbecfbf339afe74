use std::{env, str::FromStr, sync::Arc, sync::LazyLock};

use crate::credential::errors::CredentialStoreError;

use super::types::{CredentialStore, InMemoryCredentialStore, SqliteCredentialStore};

/// Table prefix from environment variable
pub(super) static DB_TABLE_PREFIX: LazyLock<String> =
    LazyLock::new(|| env::var("DB_TABLE_PREFIX").unwrap_or_else(|_| "pkc_".to_string()));

/// Users table name
pub(super) static DB_TABLE_USERS: LazyLock<String> = LazyLock::new(|| {
    env::var("DB_TABLE_USERS").unwrap_or_else(|_| format!("{}{}", *DB_TABLE_PREFIX, "users"))
});

/// Authenticators table name
pub(super) static DB_TABLE_AUTHENTICATORS: LazyLock<String> = LazyLock::new(|| {
    env::var("DB_TABLE_AUTHENTICATORS")
        .unwrap_or_else(|_| format!("{}{}", *DB_TABLE_PREFIX, "authenticators"))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CredentialStoreKind {
    Memory,
    Sqlite,
}

impl FromStr for CredentialStoreKind {
    type Err = CredentialStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(CredentialStoreError::Storage(format!(
                "Unsupported credential store type: {other}. Supported types are 'memory' and 'sqlite'"
            ))),
        }
    }
}

/// Build and initialize the credential store selected by
/// `CREDENTIAL_STORE_TYPE` (`memory` when unset) and `CREDENTIAL_STORE_URL`.
pub async fn credential_store_from_env() -> Result<Arc<dyn CredentialStore>, CredentialStoreError>
{
    let kind = env::var("CREDENTIAL_STORE_TYPE")
        .unwrap_or_else(|_| "memory".to_string())
        .parse::<CredentialStoreKind>()?;

    tracing::info!("Initializing credential store with type: {:?}", kind);

    let store: Arc<dyn CredentialStore> = match kind {
        CredentialStoreKind::Memory => Arc::new(InMemoryCredentialStore::new()),
        CredentialStoreKind::Sqlite => {
            let url = env::var("CREDENTIAL_STORE_URL").map_err(|_| {
                CredentialStoreError::Storage(
                    "CREDENTIAL_STORE_URL must be set for the sqlite credential store".to_string(),
                )
            })?;
            Arc::new(SqliteCredentialStore::connect(&url).await?)
        }
    };

    store.init().await?;
    Ok(store)
}

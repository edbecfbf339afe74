use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, Row};
use std::str::FromStr;

use crate::credential::errors::CredentialStoreError;
use crate::credential::types::{Authenticator, CredentialId, User, UserHandle, UserSummary};

use super::config::{DB_TABLE_AUTHENTICATORS, DB_TABLE_USERS};
use super::types::{CredentialStore, SqliteCredentialStore};

impl SqliteCredentialStore {
    /// Open a pool for `url` (for example `sqlite://passkeys.db` or `sqlite::memory:`).
    ///
    /// An in-memory database lives only as long as its connection, so such URLs
    /// get a single connection that is never recycled.
    pub async fn connect(url: &str) -> Result<Self, CredentialStoreError> {
        let opts = SqliteConnectOptions::from_str(url)
            .map_err(|e| CredentialStoreError::Storage(e.to_string()))?
            .create_if_missing(true);

        let pool_options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
        };

        let pool = pool_options
            .connect_with(opts)
            .await
            .map_err(|e| CredentialStoreError::Storage(e.to_string()))?;

        tracing::info!("Connected to credential database: {}", url);
        Ok(Self { pool })
    }
}

fn decode_error(e: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(e))
}

impl<'r> FromRow<'r, SqliteRow> for User {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;

        Ok(User {
            id: UserHandle::from_base64url(&id).map_err(decode_error)?,
            username: row.try_get("username")?,
            display_name: row.try_get("display_name")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for Authenticator {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let credential_id: String = row.try_get("credential_id")?;
        let user_id: String = row.try_get("user_id")?;
        let sign_count: i64 = row.try_get("sign_count")?;

        Ok(Authenticator {
            credential_id: CredentialId::from_base64url(&credential_id).map_err(decode_error)?,
            owner: UserHandle::from_base64url(&user_id).map_err(decode_error)?,
            public_key: row.try_get("public_key")?,
            sign_count: u32::try_from(sign_count).map_err(decode_error)?,
            aaguid: row.try_get("aaguid")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
            last_used_at: row.try_get("last_used_at")?,
        })
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn init(&self) -> Result<(), CredentialStoreError> {
        let users_table = DB_TABLE_USERS.as_str();
        let authenticators_table = DB_TABLE_AUTHENTICATORS.as_str();

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY NOT NULL,
                username TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL
            )
            "#,
            users_table
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| CredentialStoreError::Storage(e.to_string()))?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                credential_id TEXT PRIMARY KEY NOT NULL,
                user_id TEXT NOT NULL REFERENCES {}(id),
                public_key BLOB NOT NULL,
                sign_count INTEGER NOT NULL DEFAULT 0,
                aaguid TEXT,
                name TEXT,
                created_at TIMESTAMP NOT NULL,
                last_used_at TIMESTAMP NOT NULL
            )
            "#,
            authenticators_table, users_table
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| CredentialStoreError::Storage(e.to_string()))?;

        sqlx::query(&format!(
            r#"CREATE INDEX IF NOT EXISTS idx_{}_user_id ON {}(user_id)"#,
            authenticators_table.replace('.', "_"),
            authenticators_table
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| CredentialStoreError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn upsert_user(
        &self,
        username: &str,
        display_name: &str,
    ) -> Result<User, CredentialStoreError> {
        let users_table = DB_TABLE_USERS.as_str();
        let id = UserHandle::generate()?;

        // The UNIQUE constraint on username makes concurrent upserts converge on one row
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO {} (id, username, display_name, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(username) DO NOTHING
            "#,
            users_table
        ))
        .bind(id.to_base64url())
        .bind(username)
        .bind(display_name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| CredentialStoreError::Storage(e.to_string()))?;

        if result.rows_affected() > 0 {
            tracing::info!(username, user_id = %id, "Created user");
        }

        self.find_by_username(username).await?.ok_or_else(|| {
            CredentialStoreError::Storage(format!("User {username} vanished after upsert"))
        })
    }

    async fn attach_authenticator(
        &self,
        authenticator: Authenticator,
    ) -> Result<(), CredentialStoreError> {
        if self.find_by_id(&authenticator.owner).await?.is_none() {
            return Err(CredentialStoreError::NotFound(format!(
                "user {}",
                authenticator.owner
            )));
        }

        let authenticators_table = DB_TABLE_AUTHENTICATORS.as_str();
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO {}
            (credential_id, user_id, public_key, sign_count, aaguid, name, created_at, last_used_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(credential_id) DO NOTHING
            "#,
            authenticators_table
        ))
        .bind(authenticator.credential_id.to_base64url())
        .bind(authenticator.owner.to_base64url())
        .bind(&authenticator.public_key)
        .bind(i64::from(authenticator.sign_count))
        .bind(&authenticator.aaguid)
        .bind(&authenticator.name)
        .bind(authenticator.created_at)
        .bind(authenticator.last_used_at)
        .execute(&self.pool)
        .await
        .map_err(|e| CredentialStoreError::Storage(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(CredentialStoreError::DuplicateCredential(
                authenticator.credential_id.to_string(),
            ));
        }

        tracing::info!(
            credential_id = %authenticator.credential_id,
            user_id = %authenticator.owner,
            "Attached authenticator"
        );
        Ok(())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, CredentialStoreError> {
        let users_table = DB_TABLE_USERS.as_str();

        sqlx::query_as::<_, User>(&format!(
            r#"SELECT * FROM {} WHERE username = ?"#,
            users_table
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CredentialStoreError::Storage(e.to_string()))
    }

    async fn find_by_id(&self, user_id: &UserHandle) -> Result<Option<User>, CredentialStoreError> {
        let users_table = DB_TABLE_USERS.as_str();

        sqlx::query_as::<_, User>(&format!(r#"SELECT * FROM {} WHERE id = ?"#, users_table))
            .bind(user_id.to_base64url())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CredentialStoreError::Storage(e.to_string()))
    }

    async fn find_authenticator(
        &self,
        credential_id: &CredentialId,
    ) -> Result<Option<Authenticator>, CredentialStoreError> {
        let authenticators_table = DB_TABLE_AUTHENTICATORS.as_str();

        sqlx::query_as::<_, Authenticator>(&format!(
            r#"SELECT * FROM {} WHERE credential_id = ?"#,
            authenticators_table
        ))
        .bind(credential_id.to_base64url())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CredentialStoreError::Storage(e.to_string()))
    }

    async fn list_authenticators(
        &self,
        user_id: &UserHandle,
    ) -> Result<Vec<Authenticator>, CredentialStoreError> {
        let authenticators_table = DB_TABLE_AUTHENTICATORS.as_str();

        sqlx::query_as::<_, Authenticator>(&format!(
            r#"SELECT * FROM {} WHERE user_id = ? ORDER BY created_at, rowid"#,
            authenticators_table
        ))
        .bind(user_id.to_base64url())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CredentialStoreError::Storage(e.to_string()))
    }

    async fn update_sign_count(
        &self,
        credential_id: &CredentialId,
        sign_count: u32,
        used_at: DateTime<Utc>,
    ) -> Result<(), CredentialStoreError> {
        let authenticators_table = DB_TABLE_AUTHENTICATORS.as_str();

        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET sign_count = ?, last_used_at = ?
            WHERE credential_id = ?
            "#,
            authenticators_table
        ))
        .bind(i64::from(sign_count))
        .bind(used_at)
        .bind(credential_id.to_base64url())
        .execute(&self.pool)
        .await
        .map_err(|e| CredentialStoreError::Storage(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(CredentialStoreError::NotFound(format!(
                "credential {credential_id}"
            )));
        }
        Ok(())
    }

    async fn advance_sign_count(
        &self,
        credential_id: &CredentialId,
        expected: u32,
        sign_count: u32,
        used_at: DateTime<Utc>,
    ) -> Result<bool, CredentialStoreError> {
        let authenticators_table = DB_TABLE_AUTHENTICATORS.as_str();

        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET sign_count = ?, last_used_at = ?
            WHERE credential_id = ? AND sign_count = ?
            "#,
            authenticators_table
        ))
        .bind(i64::from(sign_count))
        .bind(used_at)
        .bind(credential_id.to_base64url())
        .bind(i64::from(expected))
        .execute(&self.pool)
        .await
        .map_err(|e| CredentialStoreError::Storage(e.to_string()))?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Nothing updated: either the counter moved or the credential is gone
        match self.find_authenticator(credential_id).await? {
            Some(_) => Ok(false),
            None => Err(CredentialStoreError::NotFound(format!(
                "credential {credential_id}"
            ))),
        }
    }

    async fn list_users(&self) -> Result<Vec<UserSummary>, CredentialStoreError> {
        let users_table = DB_TABLE_USERS.as_str();
        let authenticators_table = DB_TABLE_AUTHENTICATORS.as_str();

        let rows = sqlx::query(&format!(
            r#"
            SELECT u.id, u.username, u.display_name, u.created_at,
                   COUNT(a.credential_id) AS authenticator_count
            FROM {} u
            LEFT JOIN {} a ON a.user_id = u.id
            GROUP BY u.id
            ORDER BY u.created_at, u.username
            "#,
            users_table, authenticators_table
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CredentialStoreError::Storage(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let user = User::from_row(row)
                    .map_err(|e| CredentialStoreError::Storage(e.to_string()))?;
                let count: i64 = row
                    .try_get("authenticator_count")
                    .map_err(|e| CredentialStoreError::Storage(e.to_string()))?;

                Ok(UserSummary {
                    user_id: user.id,
                    username: user.username,
                    display_name: user.display_name,
                    authenticator_count: usize::try_from(count).unwrap_or_default(),
                    created_at: user.created_at,
                })
            })
            .collect()
    }
}

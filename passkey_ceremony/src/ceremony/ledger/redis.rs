use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::ceremony::clock::Clock;
use crate::ceremony::errors::LedgerError;
use crate::ceremony::types::{CeremonyKind, CeremonyToken, Challenge, PendingCeremony};

use super::types::{CeremonyLedger, RedisCeremonyLedger};

const LEDGER_PREFIX: &str = "ceremony";

/// Upper bound on regeneration attempts when a token is already taken.
const MAX_OPEN_ATTEMPTS: usize = 8;

impl RedisCeremonyLedger {
    pub fn new(url: &str, clock: Arc<dyn Clock>) -> Result<Self, LedgerError> {
        let client = redis::Client::open(url)?;
        tracing::info!("Creating Redis ceremony ledger at {}", url);
        Ok(Self { client, clock })
    }

    fn make_key(token: &CeremonyToken) -> String {
        format!("{LEDGER_PREFIX}:{token}")
    }

    /// Redis expiry is whole seconds; round up so a ceremony never dies early.
    fn ttl_secs(ttl: Duration) -> u64 {
        let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
        secs.max(1)
    }
}

#[async_trait]
impl CeremonyLedger for RedisCeremonyLedger {
    async fn init(&self) -> Result<(), LedgerError> {
        // Verify the connection works
        let _conn = self.client.get_multiplexed_async_connection().await?;
        Ok(())
    }

    async fn open(
        &self,
        kind: CeremonyKind,
        challenge: Challenge,
        bound_username: Option<String>,
        ttl: Duration,
    ) -> Result<CeremonyToken, LedgerError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let expires_at = self.clock.now()
            + chrono::Duration::from_std(ttl)
                .map_err(|e| LedgerError::Storage(format!("Invalid ceremony ttl: {e}")))?;

        let mut ceremony = PendingCeremony {
            token: CeremonyToken::generate()?,
            kind,
            challenge,
            bound_username,
            expires_at,
        };

        for _ in 0..MAX_OPEN_ATTEMPTS {
            let key = Self::make_key(&ceremony.token);
            let value = serde_json::to_string(&ceremony)?;

            // SET NX EX stores the entry and its expiry in one atomic step
            let stored: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(value)
                .arg("NX")
                .arg("EX")
                .arg(Self::ttl_secs(ttl))
                .query_async(&mut conn)
                .await?;

            if stored.is_some() {
                return Ok(ceremony.token);
            }

            tracing::warn!("Ceremony token collision, regenerating");
            ceremony.token = CeremonyToken::generate()?;
        }

        Err(LedgerError::Storage(
            "Could not allocate a unique ceremony token".to_string(),
        ))
    }

    async fn consume(&self, token: &CeremonyToken) -> Result<PendingCeremony, LedgerError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = Self::make_key(token);

        // GETDEL hands the entry to exactly one caller
        let value: Option<String> = redis::cmd("GETDEL")
            .arg(&key)
            .query_async(&mut conn)
            .await?;

        let Some(value) = value else {
            tracing::warn!("Unknown or already consumed ceremony token");
            return Err(LedgerError::NotFound("unknown ceremony token".to_string()));
        };

        let ceremony: PendingCeremony = serde_json::from_str(&value)?;
        if ceremony.is_expired_at(self.clock.now()) {
            tracing::warn!(
                kind = %ceremony.kind,
                expired_at = %ceremony.expires_at,
                "Ceremony consumed after expiry"
            );
            return Err(LedgerError::NotFound("ceremony expired".to_string()));
        }

        Ok(ceremony)
    }

    async fn pending_count(&self) -> Result<usize, LedgerError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let pattern = format!("{LEDGER_PREFIX}:*");

        let mut cursor: u64 = 0;
        let mut count = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;

            count += keys.len();
            if next == 0 {
                return Ok(count);
            }
            cursor = next;
        }
    }

    async fn sweep_expired(&self) -> Result<usize, LedgerError> {
        Ok(0) // Redis evicts expired keys itself
    }
}

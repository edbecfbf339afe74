use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::ceremony::clock::Clock;
use crate::ceremony::errors::LedgerError;
use crate::ceremony::types::{CeremonyKind, CeremonyToken, Challenge, PendingCeremony};

/// Single-use, expiring storage for in-flight ceremonies.
#[async_trait]
pub trait CeremonyLedger: Send + Sync + 'static {
    /// Initialize the ledger. Called once after construction.
    async fn init(&self) -> Result<(), LedgerError>;

    /// Record a new pending ceremony and return its freshly generated token.
    /// No two calls ever receive the same token.
    async fn open(
        &self,
        kind: CeremonyKind,
        challenge: Challenge,
        bound_username: Option<String>,
        ttl: Duration,
    ) -> Result<CeremonyToken, LedgerError>;

    /// Remove and return the ceremony for `token`.
    ///
    /// Fails with `NotFound` when the token is unknown, already consumed, or
    /// expired. Of any number of concurrent calls for one token, at most one
    /// succeeds.
    async fn consume(&self, token: &CeremonyToken) -> Result<PendingCeremony, LedgerError>;

    /// Number of entries currently held, expired or not.
    async fn pending_count(&self) -> Result<usize, LedgerError>;

    /// Drop every expired entry now and return how many were removed.
    async fn sweep_expired(&self) -> Result<usize, LedgerError>;
}

pub(super) struct LedgerState {
    pub(super) entries: HashMap<CeremonyToken, PendingCeremony>,
    pub(super) last_sweep: DateTime<Utc>,
}

/// Ceremony ledger held in process memory. Expired entries are evicted
/// opportunistically by `open` and `consume`, at most once per sweep interval.
pub struct InMemoryCeremonyLedger {
    pub(super) state: Mutex<LedgerState>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) sweep_interval: Duration,
}

/// Ceremony ledger in Redis, relying on key expiry for eviction.
pub struct RedisCeremonyLedger {
    pub(super) client: redis::Client,
    pub(super) clock: Arc<dyn Clock>,
}

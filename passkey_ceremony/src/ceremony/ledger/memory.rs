use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::ceremony::clock::Clock;
use crate::ceremony::errors::LedgerError;
use crate::ceremony::types::{CeremonyKind, CeremonyToken, Challenge, PendingCeremony};
use crate::config::PASSKEY_LEDGER_SWEEP_INTERVAL;

use super::types::{CeremonyLedger, InMemoryCeremonyLedger, LedgerState};

impl InMemoryCeremonyLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_sweep_interval(clock, Duration::from_secs(*PASSKEY_LEDGER_SWEEP_INTERVAL))
    }

    pub fn with_sweep_interval(clock: Arc<dyn Clock>, sweep_interval: Duration) -> Self {
        tracing::info!(
            "Creating new in-memory ceremony ledger (sweep interval {:?})",
            sweep_interval
        );
        let last_sweep = clock.now();
        Self {
            state: Mutex::new(LedgerState {
                entries: HashMap::new(),
                last_sweep,
            }),
            clock,
            sweep_interval,
        }
    }

    fn sweep_locked(state: &mut LedgerState, now: DateTime<Utc>) -> usize {
        let before = state.entries.len();
        state.entries.retain(|_, ceremony| !ceremony.is_expired_at(now));
        state.last_sweep = now;

        let removed = before - state.entries.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = state.entries.len(), "Swept expired ceremonies");
        }
        removed
    }

    fn maybe_sweep(&self, state: &mut LedgerState, now: DateTime<Utc>) {
        let due = now
            .signed_duration_since(state.last_sweep)
            .to_std()
            .map(|elapsed| elapsed >= self.sweep_interval)
            .unwrap_or(false);

        if due {
            Self::sweep_locked(state, now);
        }
    }
}

#[async_trait]
impl CeremonyLedger for InMemoryCeremonyLedger {
    async fn init(&self) -> Result<(), LedgerError> {
        Ok(()) // Nothing to initialize for in-memory ledger
    }

    async fn open(
        &self,
        kind: CeremonyKind,
        challenge: Challenge,
        bound_username: Option<String>,
        ttl: Duration,
    ) -> Result<CeremonyToken, LedgerError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| LedgerError::Storage(format!("Invalid ceremony ttl: {e}")))?;

        let mut state = self.state.lock().await;
        let now = self.clock.now();
        self.maybe_sweep(&mut state, now);

        let mut token = CeremonyToken::generate()?;
        while state.entries.contains_key(&token) {
            tracing::warn!("Ceremony token collision, regenerating");
            token = CeremonyToken::generate()?;
        }

        state.entries.insert(
            token.clone(),
            PendingCeremony {
                token: token.clone(),
                kind,
                challenge,
                bound_username,
                expires_at: now + ttl,
            },
        );

        Ok(token)
    }

    async fn consume(&self, token: &CeremonyToken) -> Result<PendingCeremony, LedgerError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let ceremony = state.entries.remove(token);
        self.maybe_sweep(&mut state, now);
        drop(state);

        match ceremony {
            Some(ceremony) if !ceremony.is_expired_at(now) => Ok(ceremony),
            Some(ceremony) => {
                tracing::warn!(
                    kind = %ceremony.kind,
                    expired_at = %ceremony.expires_at,
                    "Ceremony consumed after expiry"
                );
                Err(LedgerError::NotFound("ceremony expired".to_string()))
            }
            None => {
                tracing::warn!("Unknown or already consumed ceremony token");
                Err(LedgerError::NotFound("unknown ceremony token".to_string()))
            }
        }
    }

    async fn pending_count(&self) -> Result<usize, LedgerError> {
        Ok(self.state.lock().await.entries.len())
    }

    async fn sweep_expired(&self) -> Result<usize, LedgerError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        Ok(Self::sweep_locked(&mut state, now))
    }
}

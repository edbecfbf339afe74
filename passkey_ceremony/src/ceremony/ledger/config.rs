use std::{env, str::FromStr, sync::Arc};

use crate::ceremony::clock::Clock;
use crate::ceremony::errors::LedgerError;

use super::types::{CeremonyLedger, InMemoryCeremonyLedger, RedisCeremonyLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum LedgerKind {
    Memory,
    Redis,
}

impl FromStr for LedgerKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(LedgerError::Storage(format!(
                "Unsupported ceremony ledger type: {other}. Supported types are 'memory' and 'redis'"
            ))),
        }
    }
}

/// Build and initialize the ledger selected by `CEREMONY_LEDGER_TYPE`
/// (`memory` when unset) and `CEREMONY_LEDGER_URL`.
pub async fn ceremony_ledger_from_env(
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn CeremonyLedger>, LedgerError> {
    let kind = env::var("CEREMONY_LEDGER_TYPE")
        .unwrap_or_else(|_| "memory".to_string())
        .parse::<LedgerKind>()?;

    tracing::info!("Initializing ceremony ledger with type: {:?}", kind);

    let ledger: Arc<dyn CeremonyLedger> = match kind {
        LedgerKind::Memory => Arc::new(InMemoryCeremonyLedger::new(clock)),
        LedgerKind::Redis => {
            let url = env::var("CEREMONY_LEDGER_URL").map_err(|_| {
                LedgerError::Storage(
                    "CEREMONY_LEDGER_URL must be set for the redis ceremony ledger".to_string(),
                )
            })?;
            Arc::new(RedisCeremonyLedger::new(&url, clock)?)
        }
    };

    ledger.init().await?;
    Ok(ledger)
}

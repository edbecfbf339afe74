mod config;
mod memory;
mod redis;
mod types;

pub use config::ceremony_ledger_from_env;
pub use types::{CeremonyLedger, InMemoryCeremonyLedger, RedisCeremonyLedger};

mod clock;
mod errors;
mod ledger;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::LedgerError;
pub use ledger::{
    CeremonyLedger, InMemoryCeremonyLedger, RedisCeremonyLedger, ceremony_ledger_from_env,
};
pub use types::{CeremonyKind, CeremonyToken, Challenge, PendingCeremony};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::{UtilError, gen_random_bytes, opaque_bytes_id};

/// Number of random bytes in a ceremony token.
pub(crate) const CEREMONY_TOKEN_LEN: usize = 32;

opaque_bytes_id!(
    /// Opaque handle for one in-flight ceremony, returned to the client and
    /// supplied back on finish.
    CeremonyToken
);

opaque_bytes_id!(
    /// Challenge bytes issued to the client for a single ceremony.
    Challenge
);

impl CeremonyToken {
    pub fn generate() -> Result<Self, UtilError> {
        gen_random_bytes(CEREMONY_TOKEN_LEN).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

impl fmt::Display for CeremonyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registration => f.write_str("registration"),
            Self::Authentication => f.write_str("authentication"),
        }
    }
}

/// A ceremony that has been started and not yet finished or expired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCeremony {
    pub token: CeremonyToken,
    pub kind: CeremonyKind,
    pub challenge: Challenge,
    /// Set for username-directed ceremonies, absent for discoverable authentication
    pub bound_username: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl PendingCeremony {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

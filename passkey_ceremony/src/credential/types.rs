use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::{UtilError, gen_random_bytes, opaque_bytes_id};

/// Number of random bytes in a freshly generated user handle.
pub(crate) const USER_HANDLE_LEN: usize = 32;

opaque_bytes_id!(
    /// WebAuthn user handle: opaque bytes identifying a user, distinct from the username.
    UserHandle
);

opaque_bytes_id!(
    /// Credential identifier assigned by the client authenticator.
    CredentialId
);

impl UserHandle {
    /// Generate a new random handle from the system CSPRNG.
    pub fn generate() -> Result<Self, UtilError> {
        gen_random_bytes(USER_HANDLE_LEN).map(Self)
    }
}

/// A registered user.
///
/// The set of authenticators a user owns is kept by the store as a separate
/// index (see [`CredentialStore::list_authenticators`](super::CredentialStore::list_authenticators)),
/// so a `User` value is an immutable snapshot that never aliases store state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// WebAuthn user handle, immutable once assigned
    pub id: UserHandle,
    /// Unique human-readable identifier
    pub username: String,
    /// Non-unique label shown by authenticators
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// One registered public-key credential.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Authenticator {
    /// Globally unique across the store
    pub credential_id: CredentialId,
    /// Handle of the owning user
    pub owner: UserHandle,
    /// Encoded public key as produced by the verification engine
    pub public_key: Vec<u8>,
    /// Last accepted signature counter
    pub sign_count: u32,
    /// Authenticator model identifier, when attested
    pub aaguid: Option<String>,
    /// Optional device label
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// Read-only view of a user for listings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub user_id: UserHandle,
    pub username: String,
    pub display_name: String,
    pub authenticator_count: usize,
    pub created_at: DateTime<Utc>,
}

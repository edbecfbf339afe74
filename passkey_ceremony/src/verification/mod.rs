//! Interface to the external WebAuthn verification engine.

mod errors;
mod types;

pub use errors::VerificationError;
pub use types::{
    AuthenticationOutcome, ClientResponse, IssuedChallenge, RegistrationOutcome, UserEntity,
    VerificationEngine,
};

mod authentication;
mod errors;
mod orchestrator;
mod registration;
mod users;

pub use errors::CeremonyError;
pub use orchestrator::{CeremonyChallenge, CeremonyOrchestrator};

pub mod fake_engine;
pub mod fixtures;

pub use fake_engine::{
    EngineCall, EngineScript, FakeEngine, authentication_response, registration_response,
};
pub use fixtures::{BACKENDS, Backend, CHALLENGE_TTL, Harness, init_tracing, new_store};
pub use gated_store::GatedStore;

use std::sync::Arc;
use std::time::Duration;

use passkey_ceremony::{
    CeremonyConfig, CeremonyLedger, CeremonyOptions, CeremonyOrchestrator, Clock,
    CredentialStore, InMemoryCeremonyLedger, InMemoryCredentialStore, ManualClock,
    SqliteCredentialStore,
};

use super::fake_engine::FakeEngine;

pub const CHALLENGE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub enum Backend {
    Memory,
    Sqlite,
}

pub const BACKENDS: [Backend; 2] = [Backend::Memory, Backend::Sqlite];

/// An orchestrator wired to fresh stores, a fake engine and a manual clock.
pub struct Harness {
    pub orchestrator: CeremonyOrchestrator,
    pub store: Arc<dyn CredentialStore>,
    pub ledger: Arc<dyn CeremonyLedger>,
    pub engine: Arc<FakeEngine>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn new(backend: Backend) -> Self {
        Self::with_store(new_store(backend).await).await
    }

    /// A harness over a caller-supplied credential store.
    pub async fn with_store(store: Arc<dyn CredentialStore>) -> Self {
        let clock = Arc::new(ManualClock::default());
        let dyn_clock: Arc<dyn Clock> = clock.clone();

        store.init().await.expect("store init");

        let ledger: Arc<dyn CeremonyLedger> = Arc::new(InMemoryCeremonyLedger::with_sweep_interval(
            Arc::clone(&dyn_clock),
            Duration::from_secs(30),
        ));
        let engine = Arc::new(FakeEngine::new());

        let orchestrator = CeremonyOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&ledger),
            engine.clone(),
            dyn_clock,
            CeremonyConfig {
                challenge_ttl: CHALLENGE_TTL,
                options: CeremonyOptions::default(),
            },
        );

        Self {
            orchestrator,
            store,
            ledger,
            engine,
            clock,
        }
    }
}

/// A fresh, uninitialized credential store for `backend`.
pub async fn new_store(backend: Backend) -> Arc<dyn CredentialStore> {
    match backend {
        Backend::Memory => Arc::new(InMemoryCredentialStore::new()),
        Backend::Sqlite => Arc::new(
            SqliteCredentialStore::connect("sqlite::memory:")
                .await
                .expect("sqlite store"),
        ),
    }
}

/// Opt-in log output: `RUST_LOG=passkey_ceremony=debug cargo test`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

use passkey_ceremony::{
    CeremonyError, CeremonyKind, CeremonyLedger, Challenge, CredentialId, CredentialStore,
    InMemoryCeremonyLedger, InMemoryCredentialStore, SystemClock,
};

use crate::common::{
    BACKENDS, CHALLENGE_TTL, GatedStore, Harness, authentication_response, new_store,
    registration_response,
};

/// Register credential `k` for alice with counter 5, then finish two
/// discoverable authentications whose counter checks read the same state.
async fn race_two_assertions(
    backend: crate::common::Backend,
    reported: [u32; 2],
) -> (Vec<Result<(), CeremonyError>>, u32) {
    let gated = Arc::new(GatedStore::new(new_store(backend).await, 2));
    let h = Arc::new(Harness::with_store(gated.clone()).await);

    let started = h
        .orchestrator
        .begin_registration("alice", "Alice")
        .await
        .unwrap();
    let alice = h
        .orchestrator
        .finish_registration(&started.token, &registration_response(&started, b"k", 5), None)
        .await
        .unwrap()
        .owner;

    let mut ceremonies = Vec::new();
    for count in reported {
        let started = h.orchestrator.begin_authentication(None).await.unwrap();
        let response = authentication_response(&started, b"k", Some(&alice), count);
        ceremonies.push((started.token, response));
    }

    // Engine lookup and counter read for each flow meet at the barrier
    gated.arm(4);
    let mut tasks = Vec::new();
    for (token, response) in ceremonies {
        let h = Arc::clone(&h);
        tasks.push(tokio::spawn(async move {
            h.orchestrator
                .finish_authentication(&token, &response)
                .await
                .map(|_| ())
        }));
    }

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap());
    }
    let stored = h
        .store
        .find_authenticator(&CredentialId::new(b"k".to_vec()))
        .await
        .unwrap()
        .unwrap()
        .sign_count;
    (results, stored)
}

#[tokio::test]
async fn test_concurrent_replay_of_one_counter_is_an_anomaly() {
    for backend in BACKENDS {
        // When two assertions both report 6 over a stored 5
        let (results, stored) = race_two_assertions(backend, [6, 6]).await;

        // Then one is accepted and the other is flagged as a clone
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "{backend:?}");
        let failure = results
            .into_iter()
            .find_map(Result::err)
            .expect("one assertion rejected");
        assert!(
            matches!(
                failure,
                CeremonyError::SignCountAnomaly {
                    stored: 6,
                    reported: 6,
                    ..
                }
            ),
            "{backend:?}: {failure:?}"
        );
        assert!(failure.is_security_event());
        assert_eq!(stored, 6);
    }
}

#[tokio::test]
async fn test_concurrent_assertions_never_lower_the_counter() {
    for backend in BACKENDS {
        // When assertions reporting 7 and 6 race over a stored 5
        let (results, stored) = race_two_assertions(backend, [7, 6]).await;

        // Then only one lands and the stored counter is the accepted value
        let accepted: Vec<u32> = [7, 6]
            .into_iter()
            .zip(&results)
            .filter(|(_, r)| r.is_ok())
            .map(|(count, _)| count)
            .collect();
        assert_eq!(accepted.len(), 1, "{backend:?}");
        assert_eq!(stored, accepted[0]);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| matches!(e, CeremonyError::SignCountAnomaly { .. }))
        );
    }
}

#[tokio::test]
async fn test_concurrent_finish_on_one_token() {
    for backend in BACKENDS {
        // Given one pending registration
        let h = Arc::new(Harness::new(backend).await);
        let started = h
            .orchestrator
            .begin_registration("alice", "Alice")
            .await
            .unwrap();
        let response = registration_response(&started, b"k1", 0);

        // When many requests race to finish it
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let h = Arc::clone(&h);
            let token = started.token.clone();
            let response = response.clone();
            tasks.push(tokio::spawn(async move {
                h.orchestrator
                    .finish_registration(&token, &response, None)
                    .await
            }));
        }

        // Then exactly one wins and the rest see no ceremony
        let mut successes = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => successes += 1,
                Err(e) => assert_eq!(e, CeremonyError::CeremonyNotFound),
            }
        }
        assert_eq!(successes, 1, "{backend:?}");
        assert_eq!(h.orchestrator.list_credentials("alice").await.unwrap().len(), 1);
    }
}

#[tokio::test]
async fn test_parallel_ceremonies_for_one_user() {
    for backend in BACKENDS {
        // Given several devices registering for alice at once
        let h = Arc::new(Harness::new(backend).await);
        let mut started = Vec::new();
        for _ in 0..4 {
            started.push(
                h.orchestrator
                    .begin_registration("alice", "Alice")
                    .await
                    .unwrap(),
            );
        }

        // When they finish in reverse order
        for (i, ceremony) in started.iter().enumerate().rev() {
            let credential = format!("device-{i}");
            h.orchestrator
                .finish_registration(
                    &ceremony.token,
                    &registration_response(ceremony, credential.as_bytes(), 0),
                    None,
                )
                .await
                .unwrap();
        }

        // Then every device is registered to the same user
        let credentials = h.orchestrator.list_credentials("alice").await.unwrap();
        assert_eq!(credentials.len(), 4);
        assert!(credentials.windows(2).all(|w| w[0].owner == w[1].owner));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_upsert_user_is_idempotent(usernames in prop::collection::vec("[a-z]{1,6}", 1..20)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = InMemoryCredentialStore::new();
            let mut first_ids = std::collections::HashMap::new();

            for username in &usernames {
                let user = store.upsert_user(username, "display").await.unwrap();
                let first = first_ids
                    .entry(username.clone())
                    .or_insert_with(|| user.id.clone())
                    .clone();
                prop_assert_eq!(user.id, first);
            }

            let distinct: HashSet<_> = usernames.iter().collect();
            prop_assert_eq!(store.list_users().await.unwrap().len(), distinct.len());
            Ok(())
        })?;
    }

    #[test]
    fn test_ledger_consume_at_most_once(opens in 1usize..40, consumes in 1usize..4) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ledger = InMemoryCeremonyLedger::new(Arc::new(SystemClock));
            let mut tokens = Vec::new();
            for i in 0..opens {
                let token = ledger
                    .open(
                        CeremonyKind::Authentication,
                        Challenge::new(vec![i as u8]),
                        None,
                        CHALLENGE_TTL,
                    )
                    .await
                    .unwrap();
                tokens.push(token);
            }

            let distinct: HashSet<_> = tokens.iter().collect();
            prop_assert_eq!(distinct.len(), opens);

            for token in &tokens {
                let mut successes = 0;
                for _ in 0..consumes {
                    if ledger.consume(token).await.is_ok() {
                        successes += 1;
                    }
                }
                prop_assert_eq!(successes, 1);
            }
            prop_assert_eq!(ledger.pending_count().await.unwrap(), 0);
            Ok(())
        })?;
    }
}

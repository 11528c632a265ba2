// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Notify;

use super::*;
use crate::circuit::{MockVoteProver, VoteProof};
use crate::registry::{LeafEvent, MockLeafEventSource, MockRegistry, Schedule};
use crate::store::InMemoryStore;
use crate::ErrorKind;
use crate::tree::MembershipTree;

const INDEX: u64 = 2;

struct Fixture {
    record: CommitmentRecord,
    events: Vec<LeafEvent>,
    root: BlsScalar,
}

fn fixture() -> Fixture {
    let mut rng = StdRng::seed_from_u64(0xbeef);
    let records: Vec<_> = (0..5)
        .map(|_| CommitmentRecord::generate(&mut rng))
        .collect();

    let tree = MembershipTree::from_leaves(
        records.iter().map(CommitmentRecord::commitment),
    )
    .unwrap();
    let events = tree
        .leaves()
        .iter()
        .zip(0..)
        .map(|(value, index)| LeafEvent {
            index,
            value: *value,
        })
        .collect();

    Fixture {
        record: records[INDEX as usize].with_index(INDEX),
        events,
        root: tree.root().unwrap(),
    }
}

fn session() -> VoterSession {
    VoterSession::new("poll", "alice")
}

fn config() -> BallotConfig {
    BallotConfig {
        retry_delay_ms: 10,
        confirmation_poll_ms: 10,
        confirmation_timeout_ms: 100,
        submission_timeout_ms: 100,
        ..BallotConfig::default()
    }
}

fn schedule() -> Schedule {
    Schedule {
        registration_deadline: 0,
        voting_end: None,
        num_options: 3,
    }
}

fn registry(fx: &Fixture) -> MockRegistry {
    let root = fx.root;
    let mut registry = MockRegistry::new();
    registry.expect_schedule().returning(|_| Ok(schedule()));
    registry.expect_current_root().returning(move |_| Ok(Some(root)));
    registry
}

fn events(fx: &Fixture) -> MockLeafEventSource {
    let history = fx.events.clone();
    let mut events = MockLeafEventSource::new();
    events
        .expect_fetch_leaf_events()
        .returning(move |_| Ok(history.clone()));
    events
}

fn prover() -> MockVoteProver {
    let mut prover = MockVoteProver::new();
    prover.expect_prove().returning(|witness| {
        witness.check()?;
        Ok(VoteProof {
            proof: vec![0xab; 16],
            public: *witness.public(),
        })
    });
    prover
}

// A prover that signals once it started, then waits for a go-ahead.
fn blocking_prover() -> (MockVoteProver, Arc<Notify>, mpsc::Sender<()>) {
    let started = Arc::new(Notify::new());
    let (release, blocked) = mpsc::channel();
    let blocked = Mutex::new(blocked);

    let notify = started.clone();
    let mut prover = MockVoteProver::new();
    prover.expect_prove().returning(move |witness| {
        notify.notify_one();
        blocked.lock().unwrap().recv().ok();
        witness.check()?;
        Ok(VoteProof {
            proof: vec![0xab; 16],
            public: *witness.public(),
        })
    });

    (prover, started, release)
}

async fn store(fx: &Fixture) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store.set_commitment(&session(), &fx.record).await.unwrap();
    store
}

fn build(
    events: MockLeafEventSource,
    registry: MockRegistry,
    prover: MockVoteProver,
    store: Arc<InMemoryStore>,
) -> VotePipeline {
    VotePipeline::new(
        Arc::new(events),
        Arc::new(registry),
        Arc::new(prover),
        store,
        config(),
    )
}

#[tokio::test]
async fn vote_is_confirmed() {
    let fx = fixture();
    let store = store(&fx).await;
    let nullifier_hash = fx.record.nullifier_hash();

    let mut registry = registry(&fx);
    registry
        .expect_submit_vote()
        .once()
        .returning(move |_, vote| {
            let public = vote.public_inputs().unwrap();
            assert_eq!(public.nullifier_hash, nullifier_hash);
            assert_eq!(public.depth, 3);
            Ok(VoteReceipt {
                nullifier_hash,
                vote: public.vote,
            })
        });

    let pipeline = build(events(&fx), registry, prover(), store.clone());
    let outcome = pipeline.cast_vote(&session(), 1).await.unwrap();

    assert_eq!(
        outcome,
        VoteOutcome::Confirmed {
            nullifier_hash,
            receipt: Some(VoteReceipt {
                nullifier_hash,
                vote: 1
            }),
        }
    );
    let record = store.get_vote(&session()).await.unwrap().unwrap();
    assert_eq!(record.status, VoteStatus::Confirmed);
    assert_eq!(record.choice, 1);
}

#[tokio::test]
async fn confirmed_vote_is_never_resubmitted() {
    let fx = fixture();
    let store = store(&fx).await;
    store
        .set_vote(
            &session(),
            &VoteRecord {
                nullifier_hash: fx.record.nullifier_hash(),
                choice: 0,
                status: VoteStatus::Confirmed,
            },
        )
        .await
        .unwrap();

    let mut registry = MockRegistry::new();
    registry.expect_submit_vote().never();
    let mut prover = MockVoteProver::new();
    prover.expect_prove().never();

    let pipeline = build(MockLeafEventSource::new(), registry, prover, store);

    assert_eq!(
        pipeline.cast_vote(&session(), 2).await.unwrap(),
        VoteOutcome::AlreadyVoted {
            nullifier_hash: fx.record.nullifier_hash()
        }
    );
}

#[tokio::test]
async fn pending_vote_is_resolved_before_voting_again() {
    let fx = fixture();
    let store = store(&fx).await;
    store
        .set_vote(
            &session(),
            &VoteRecord {
                nullifier_hash: fx.record.nullifier_hash(),
                choice: 0,
                status: VoteStatus::Submitted,
            },
        )
        .await
        .unwrap();

    let mut registry = MockRegistry::new();
    registry
        .expect_is_nullifier_used()
        .once()
        .returning(|_, _| Ok(true));
    registry.expect_submit_vote().never();

    let pipeline = build(
        MockLeafEventSource::new(),
        registry,
        MockVoteProver::new(),
        store.clone(),
    );

    assert!(matches!(
        pipeline.cast_vote(&session(), 0).await,
        Ok(VoteOutcome::AlreadyVoted { .. })
    ));
    assert_eq!(
        store.get_vote(&session()).await.unwrap().unwrap().status,
        VoteStatus::Confirmed
    );
}

#[tokio::test(start_paused = true)]
async fn pending_vote_is_awaited_before_voting_again() {
    let fx = fixture();
    let store = store(&fx).await;
    store
        .set_vote(
            &session(),
            &VoteRecord {
                nullifier_hash: fx.record.nullifier_hash(),
                choice: 0,
                status: VoteStatus::Submitted,
            },
        )
        .await
        .unwrap();

    // the earlier transaction is still pending on the first query
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut registry = MockRegistry::new();
    registry
        .expect_is_nullifier_used()
        .returning(move |_, _| Ok(counter.fetch_add(1, Ordering::SeqCst) > 0));
    registry.expect_submit_vote().never();
    let mut prover = MockVoteProver::new();
    prover.expect_prove().never();

    let pipeline = build(
        MockLeafEventSource::new(),
        registry,
        prover,
        store.clone(),
    );

    assert_eq!(
        pipeline.cast_vote(&session(), 0).await.unwrap(),
        VoteOutcome::AlreadyVoted {
            nullifier_hash: fx.record.nullifier_hash()
        }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        store.get_vote(&session()).await.unwrap().unwrap().status,
        VoteStatus::Confirmed
    );
}

#[tokio::test(start_paused = true)]
async fn lost_submission_is_sent_again_after_the_deadline() {
    let fx = fixture();
    let store = store(&fx).await;
    let nullifier_hash = fx.record.nullifier_hash();
    store
        .set_vote(
            &session(),
            &VoteRecord {
                nullifier_hash,
                choice: 0,
                status: VoteStatus::Submitted,
            },
        )
        .await
        .unwrap();

    let mut registry = registry(&fx);
    registry
        .expect_is_nullifier_used()
        .returning(|_, _| Ok(false));
    registry.expect_submit_vote().once().returning(move |_, _| {
        Ok(VoteReceipt {
            nullifier_hash,
            vote: 0,
        })
    });

    let pipeline = build(events(&fx), registry, prover(), store.clone());
    let started = tokio::time::Instant::now();

    assert!(matches!(
        pipeline.cast_vote(&session(), 0).await,
        Ok(VoteOutcome::Confirmed {
            receipt: Some(_),
            ..
        })
    ));
    assert!(started.elapsed() >= config().confirmation_timeout());
}

#[tokio::test]
async fn out_of_range_choice_is_refused_before_proving() {
    let fx = fixture();
    let mut prover = MockVoteProver::new();
    prover.expect_prove().never();

    let pipeline = build(events(&fx), registry(&fx), prover, store(&fx).await);

    assert!(matches!(
        pipeline.cast_vote(&session(), 3).await,
        Err(Error::InvalidChoice {
            choice: 3,
            options: 3
        })
    ));
}

#[tokio::test]
async fn missing_commitment_is_fatal() {
    let fx = fixture();
    let pipeline = build(
        events(&fx),
        registry(&fx),
        MockVoteProver::new(),
        Arc::new(InMemoryStore::new()),
    );

    let err = pipeline.cast_vote(&session(), 0).await.unwrap_err();

    assert!(matches!(err, Error::InvalidSecretMaterial(_)));
    assert!(!err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn lagging_history_is_fetched_again() {
    let fx = fixture();
    let history = fx.events.clone();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut events = MockLeafEventSource::new();
    let counter = calls.clone();
    events.expect_fetch_leaf_events().returning(move |_| {
        // the indexer has not seen the voter's leaf yet
        match counter.fetch_add(1, Ordering::SeqCst) {
            0 => Ok(history[..INDEX as usize].to_vec()),
            _ => Ok(history.clone()),
        }
    });

    let mut registry = registry(&fx);
    let nullifier_hash = fx.record.nullifier_hash();
    registry.expect_submit_vote().once().returning(move |_, _| {
        Ok(VoteReceipt {
            nullifier_hash,
            vote: 0,
        })
    });

    let pipeline = build(events, registry, prover(), store(&fx).await);

    assert!(matches!(
        pipeline.cast_vote(&session(), 0).await,
        Ok(VoteOutcome::Confirmed { .. })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn gapped_history_fails_after_retries() {
    let fx = fixture();
    let mut history = fx.events.clone();
    history.remove(1);

    let mut events = MockLeafEventSource::new();
    events
        .expect_fetch_leaf_events()
        .times(3)
        .returning(move |_| Ok(history.clone()));

    let mut prover = MockVoteProver::new();
    prover.expect_prove().never();

    let pipeline = build(events, registry(&fx), prover, store(&fx).await);

    let err = pipeline.cast_vote(&session(), 0).await.unwrap_err();
    assert!(matches!(
        err,
        Error::InconsistentLeafHistory(HistoryError::Gap { .. })
    ));
    assert!(err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn stale_root_is_retryable() {
    let fx = fixture();

    let mut registry = MockRegistry::new();
    registry.expect_schedule().returning(|_| Ok(schedule()));
    registry
        .expect_current_root()
        .returning(|_| Ok(Some(BlsScalar::one())));

    let pipeline = build(
        events(&fx),
        registry,
        MockVoteProver::new(),
        store(&fx).await,
    );

    assert!(matches!(
        pipeline.cast_vote(&session(), 0).await,
        Err(Error::InconsistentLeafHistory(HistoryError::StaleRoot))
    ));
}

#[tokio::test]
async fn reused_nullifier_means_already_voted() {
    let fx = fixture();

    let mut registry = registry(&fx);
    registry
        .expect_submit_vote()
        .returning(|_, _| Err(RegistryError::NullifierAlreadyUsed));
    registry
        .expect_is_nullifier_used()
        .returning(|_, _| Ok(true));

    let pipeline = build(events(&fx), registry, prover(), store(&fx).await);

    assert_eq!(
        pipeline.cast_vote(&session(), 1).await.unwrap(),
        VoteOutcome::AlreadyVoted {
            nullifier_hash: fx.record.nullifier_hash()
        }
    );
}

#[tokio::test]
async fn rejected_vote_is_marked_failed() {
    let fx = fixture();
    let store = store(&fx).await;

    let mut registry = registry(&fx);
    registry
        .expect_submit_vote()
        .returning(|_, _| Err(RegistryError::InvalidProof));

    let pipeline = build(events(&fx), registry, prover(), store.clone());

    let err = pipeline.cast_vote(&session(), 1).await.unwrap_err();
    assert!(matches!(
        err,
        Error::SubmissionRejected(RegistryError::InvalidProof)
    ));
    assert_eq!(
        store.get_vote(&session()).await.unwrap().unwrap().status,
        VoteStatus::Failed
    );
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_vote_is_resolved_later() {
    let fx = fixture();
    let store = store(&fx).await;
    let counted = Arc::new(AtomicBool::new(false));

    let mut registry = registry(&fx);
    registry
        .expect_submit_vote()
        .once()
        .returning(|_, _| Err(RegistryError::Unavailable("timeout".into())));
    let flag = counted.clone();
    registry
        .expect_is_nullifier_used()
        .returning(move |_, _| Ok(flag.load(Ordering::SeqCst)));

    let pipeline = build(events(&fx), registry, prover(), store.clone());
    let err = pipeline.cast_vote(&session(), 1).await.unwrap_err();

    assert!(matches!(err, Error::SubmissionUnconfirmed { .. }));
    assert_eq!(err.kind(), ErrorKind::Unconfirmed);
    assert_eq!(
        pipeline.resolve(&session()).await.unwrap(),
        Some(VoteStatus::Submitted)
    );
    assert!(!pipeline.has_voted(&session()).await.unwrap());

    // the transaction lands eventually
    counted.store(true, Ordering::SeqCst);

    assert_eq!(
        pipeline.resolve(&session()).await.unwrap(),
        Some(VoteStatus::Confirmed)
    );
    assert!(pipeline.has_voted(&session()).await.unwrap());
}

#[test]
fn one_vote_in_flight_per_session() {
    let sessions = Arc::new(Mutex::new(HashSet::new()));

    let guard = InFlight::acquire(&sessions, &session()).unwrap();
    assert!(matches!(
        InFlight::acquire(&sessions, &session()),
        Err(Error::VoteInFlight(_))
    ));

    let other = VoterSession::new("poll", "bob");
    assert!(InFlight::acquire(&sessions, &other).is_ok());

    drop(guard);
    assert!(InFlight::acquire(&sessions, &session()).is_ok());
}

#[tokio::test]
async fn concurrent_vote_on_the_same_session_is_refused() {
    let fx = fixture();
    let nullifier_hash = fx.record.nullifier_hash();
    let (prover, started, release) = blocking_prover();

    let mut registry = registry(&fx);
    registry.expect_submit_vote().once().returning(move |_, _| {
        Ok(VoteReceipt {
            nullifier_hash,
            vote: 1,
        })
    });

    let pipeline = build(events(&fx), registry, prover, store(&fx).await);

    let second = async {
        started.notified().await;
        let outcome = pipeline.cast_vote(&session(), 1).await;
        release.send(()).unwrap();
        outcome
    };
    let first_session = session();
    let (first, second) =
        tokio::join!(pipeline.cast_vote(&first_session, 1), second);

    assert!(matches!(first, Ok(VoteOutcome::Confirmed { .. })));
    assert!(matches!(second, Err(Error::VoteInFlight(_))));
}

#[tokio::test]
async fn dropped_vote_releases_its_session() {
    let fx = fixture();
    let (prover, started, release) = blocking_prover();

    let pipeline = build(events(&fx), registry(&fx), prover, store(&fx).await);

    let held_session = session();
    tokio::select! {
        _ = pipeline.cast_vote(&held_session, 1) => panic!("the prover is held"),
        _ = started.notified() => {}
    }
    release.send(()).unwrap();

    assert!(matches!(
        pipeline.cast_vote(&session(), 5).await,
        Err(Error::InvalidChoice {
            choice: 5,
            options: 3
        })
    ));
}

#[tokio::test]
async fn registration_stores_secrets_first() {
    let store = Arc::new(InMemoryStore::new());
    let session = session();

    let mut registry = MockRegistry::new();
    registry.expect_has_registered().returning(|_, _| Ok(false));
    registry
        .expect_is_registered_voter()
        .returning(|_, _| Ok(true));
    registry
        .expect_insert_commitment()
        .once()
        .returning(|_, _, _| Err(RegistryError::Unavailable("down".into())));

    let pipeline = build(
        MockLeafEventSource::new(),
        registry,
        MockVoteProver::new(),
        store.clone(),
    );

    let err = pipeline.register(&session).await.unwrap_err();
    assert!(err.is_retryable());

    // the secrets survive the failed insertion
    let stored = store.get_commitment(&session).await.unwrap().unwrap();
    assert_eq!(stored.index(), None);

    let mut registry = MockRegistry::new();
    registry.expect_has_registered().returning(|_, _| Ok(false));
    registry
        .expect_is_registered_voter()
        .returning(|_, _| Ok(true));
    let commitment = stored.commitment();
    registry
        .expect_insert_commitment()
        .once()
        .withf(move |_, _, c| *c == commitment)
        .returning(|_, _, _| Ok(4));

    let pipeline = build(
        MockLeafEventSource::new(),
        registry,
        MockVoteProver::new(),
        store.clone(),
    );

    let record = pipeline.register(&session).await.unwrap();
    assert_eq!(record, stored.with_index(4));

    // registering again returns the stored record
    assert_eq!(pipeline.register(&session).await.unwrap(), record);
}

#[tokio::test]
async fn registered_voter_recovers_its_index() {
    let fx = fixture();
    let store = Arc::new(InMemoryStore::new());
    let unindexed = CommitmentRecord::new(
        fx.record.nullifier(),
        fx.record.secret(),
    );
    store.set_commitment(&session(), &unindexed).await.unwrap();

    let mut registry = MockRegistry::new();
    registry.expect_has_registered().returning(|_, _| Ok(true));
    registry.expect_insert_commitment().never();

    let pipeline = build(
        events(&fx),
        registry,
        MockVoteProver::new(),
        store.clone(),
    );

    let record = pipeline.register(&session()).await.unwrap();
    assert_eq!(record.index(), Some(INDEX));
}

#[tokio::test]
async fn ineligible_voter_is_refused() {
    let mut registry = MockRegistry::new();
    registry.expect_has_registered().returning(|_, _| Ok(false));
    registry
        .expect_is_registered_voter()
        .returning(|_, _| Ok(false));
    registry.expect_insert_commitment().never();

    let pipeline = build(
        MockLeafEventSource::new(),
        registry,
        MockVoteProver::new(),
        Arc::new(InMemoryStore::new()),
    );

    assert!(matches!(
        pipeline.register(&session()).await,
        Err(Error::NotEligible)
    ));
}

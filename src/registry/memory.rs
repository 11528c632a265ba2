// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dusk_bls12_381::BlsScalar;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    LeafEvent, LeafEventSource, Registry, RegistryError, Schedule,
    VoteReceipt,
};
use crate::circuit::ProofVerifier;
use crate::encoding::{to_be_bytes, EncodedVote, WORD_SIZE};
use crate::session::{TreeId, VoterId};
use crate::tree::{MembershipTree, TreeState};

/// Source of the current time, in unix seconds.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> u64;
}

/// [`Clock`] reading the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }
}

/// [`Clock`] moved by hand.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    /// A clock stopped at `now`.
    pub fn new(now: u64) -> Self {
        Self(AtomicU64::new(now))
    }

    /// Move the clock to `now`.
    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }

    /// Move the clock `secs` seconds forward.
    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

struct Ballot {
    schedule: Schedule,
    voters: HashSet<VoterId>,
    registered: HashSet<VoterId>,
    tree: MembershipTree,
    nullifiers: HashSet<[u8; WORD_SIZE]>,
    tallies: Vec<u64>,
}

impl Ballot {
    // the tree is read-only once registrations are closed
    fn tick(&mut self, now: u64) {
        if now >= self.schedule.registration_deadline
            && self.tree.state() != TreeState::Frozen
        {
            self.tree.freeze();
        }
    }
}

/// In-memory registry, enforcing the same rules as the on-chain voting
/// contract.
pub struct InMemoryRegistry {
    ballots: Mutex<HashMap<TreeId, Ballot>>,
    verifier: Arc<dyn ProofVerifier>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRegistry {
    /// Creates a registry checking proofs with `verifier`.
    pub fn new(
        verifier: Arc<dyn ProofVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ballots: Mutex::new(HashMap::new()),
            verifier,
            clock,
        }
    }

    /// Opens a voting session for the allowlisted `voters`.
    pub async fn open_ballot<I>(
        &self,
        tree: TreeId,
        schedule: Schedule,
        voters: I,
    ) where
        I: IntoIterator<Item = VoterId>,
    {
        let ballot = Ballot {
            schedule,
            voters: voters.into_iter().collect(),
            registered: HashSet::new(),
            tree: MembershipTree::new(),
            nullifiers: HashSet::new(),
            tallies: vec![0; schedule.num_options as usize],
        };

        info!(%tree, voters = ballot.voters.len(), "ballot opened");
        self.ballots.lock().await.insert(tree, ballot);
    }

    /// Votes counted per option.
    pub async fn tallies(
        &self,
        tree: &TreeId,
    ) -> Result<Vec<u64>, RegistryError> {
        self.with_ballot(tree, |b| Ok(b.tallies.clone())).await
    }

    async fn with_ballot<T, F>(
        &self,
        tree: &TreeId,
        f: F,
    ) -> Result<T, RegistryError>
    where
        F: FnOnce(&mut Ballot) -> Result<T, RegistryError>,
    {
        let mut ballots = self.ballots.lock().await;
        let ballot = ballots
            .get_mut(tree)
            .ok_or_else(|| RegistryError::UnknownTree(tree.clone()))?;

        ballot.tick(self.clock.now());
        f(ballot)
    }
}

#[async_trait]
impl LeafEventSource for InMemoryRegistry {
    async fn fetch_leaf_events(
        &self,
        tree: &TreeId,
    ) -> Result<Vec<LeafEvent>, RegistryError> {
        self.with_ballot(tree, |b| {
            Ok(b.tree
                .leaves()
                .iter()
                .enumerate()
                .map(|(i, value)| LeafEvent {
                    index: i as u64,
                    value: *value,
                })
                .collect())
        })
        .await
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn insert_commitment(
        &self,
        tree: &TreeId,
        voter: &VoterId,
        commitment: BlsScalar,
    ) -> Result<u64, RegistryError> {
        let now = self.clock.now();

        self.with_ballot(tree, |b| {
            if now >= b.schedule.registration_deadline {
                return Err(RegistryError::RegistrationPeriodOver);
            }
            if !b.voters.contains(voter) {
                return Err(RegistryError::NotAllowedToVote);
            }
            if b.registered.contains(voter) {
                return Err(RegistryError::AlreadyRegistered);
            }
            if b.tree.contains(&commitment) {
                return Err(RegistryError::CommitmentAlreadyAdded);
            }

            let index = b.tree.insert(commitment)?;
            b.registered.insert(voter.clone());

            debug!(%tree, index, "commitment inserted");
            Ok(index)
        })
        .await
    }

    async fn current_root(
        &self,
        tree: &TreeId,
    ) -> Result<Option<BlsScalar>, RegistryError> {
        self.with_ballot(tree, |b| Ok(b.tree.root())).await
    }

    async fn current_depth(&self, tree: &TreeId) -> Result<u64, RegistryError> {
        self.with_ballot(tree, |b| Ok(b.tree.depth() as u64)).await
    }

    async fn is_registered_voter(
        &self,
        tree: &TreeId,
        voter: &VoterId,
    ) -> Result<bool, RegistryError> {
        self.with_ballot(tree, |b| Ok(b.voters.contains(voter))).await
    }

    async fn has_registered(
        &self,
        tree: &TreeId,
        voter: &VoterId,
    ) -> Result<bool, RegistryError> {
        self.with_ballot(tree, |b| Ok(b.registered.contains(voter)))
            .await
    }

    async fn schedule(&self, tree: &TreeId) -> Result<Schedule, RegistryError> {
        self.with_ballot(tree, |b| Ok(b.schedule)).await
    }

    async fn submit_vote(
        &self,
        tree: &TreeId,
        vote: &EncodedVote,
    ) -> Result<VoteReceipt, RegistryError> {
        let now = self.clock.now();
        let verifier = Arc::clone(&self.verifier);

        self.with_ballot(tree, |b| {
            if now < b.schedule.registration_deadline {
                return Err(RegistryError::RegistrationPeriodNotOver);
            }
            if matches!(b.schedule.voting_end, Some(end) if now >= end) {
                return Err(RegistryError::VotingClosed);
            }

            let public = vote
                .public_inputs()
                .map_err(|_| RegistryError::InvalidProof)?;

            if public.vote >= b.schedule.num_options {
                return Err(RegistryError::InvalidOptionIndex {
                    vote: public.vote,
                    options: b.schedule.num_options,
                });
            }
            if b.nullifiers.contains(&vote.nullifier_hash) {
                return Err(RegistryError::NullifierAlreadyUsed);
            }
            if b.tree.root() != Some(public.root) {
                return Err(RegistryError::RootMismatch);
            }
            if b.tree.depth() as u64 != public.depth {
                return Err(RegistryError::DepthMismatch);
            }

            verifier
                .verify(&vote.proof, &public)
                .map_err(|_| RegistryError::InvalidProof)?;

            b.nullifiers.insert(vote.nullifier_hash);
            b.tallies[public.vote as usize] += 1;

            info!(%tree, vote = public.vote, "vote counted");
            Ok(VoteReceipt {
                nullifier_hash: public.nullifier_hash,
                vote: public.vote,
            })
        })
        .await
    }

    async fn is_nullifier_used(
        &self,
        tree: &TreeId,
        nullifier_hash: BlsScalar,
    ) -> Result<bool, RegistryError> {
        let key = to_be_bytes(&nullifier_hash);
        self.with_ballot(tree, |b| Ok(b.nullifiers.contains(&key)))
            .await
    }
}

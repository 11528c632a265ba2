// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! From a stored commitment and the leaf history to a counted vote.
//!
//! [`VotePipeline::cast_vote`] fetches the leaf history of the session,
//! rebuilds the tree, extracts the membership path of the voter's
//! commitment, proves the vote on a blocking thread, encodes it and submits
//! it, then waits for the registry to count it.
//!
//! At most one vote per [`VoterSession`] is in flight at any time, and a
//! vote that was sent is never sent again: an unconfirmed submission is
//! resolved by asking the registry whether its nullifier hash was used.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use dusk_bls12_381::BlsScalar;
use rand_core::OsRng;
use tracing::{debug, info, warn};

use crate::circuit::{VoteProver, VoteWitness};
use crate::commitment::CommitmentRecord;
use crate::config::BallotConfig;
use crate::encoding::{to_hex, EncodedVote};
use crate::registry::{LeafEventSource, Registry, RegistryError, VoteReceipt};
use crate::session::VoterSession;
use crate::store::{LocalStore, VoteRecord, VoteStatus};
use crate::tree::MembershipProof;
use crate::Error;

mod history;
mod retry;
#[cfg(test)]
mod tests;

pub use history::{validate, HistoryError, TreeCache};
pub use retry::{Backoff, RetryPolicy};

/// Final state of a vote attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The vote was counted.
    Confirmed {
        /// Nullifier hash consumed by the vote.
        nullifier_hash: BlsScalar,
        /// Acknowledgement of the registry, if it answered the submission.
        receipt: Option<VoteReceipt>,
    },
    /// A vote was already counted for this voter.
    AlreadyVoted {
        /// Nullifier hash consumed by the earlier vote.
        nullifier_hash: BlsScalar,
    },
}

// Marks a session as busy until dropped.
struct InFlight {
    sessions: Arc<Mutex<HashSet<VoterSession>>>,
    session: VoterSession,
}

impl InFlight {
    fn acquire(
        sessions: &Arc<Mutex<HashSet<VoterSession>>>,
        session: &VoterSession,
    ) -> Result<Self, Error> {
        let inserted = sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.clone());

        if !inserted {
            return Err(Error::VoteInFlight(session.clone()));
        }

        Ok(Self {
            sessions: Arc::clone(sessions),
            session: session.clone(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.session);
    }
}

/// Drives registrations and votes of voters against a registry.
pub struct VotePipeline {
    events: Arc<dyn LeafEventSource>,
    registry: Arc<dyn Registry>,
    prover: Arc<dyn VoteProver>,
    store: Arc<dyn LocalStore>,
    config: BallotConfig,
    cache: Mutex<TreeCache>,
    in_flight: Arc<Mutex<HashSet<VoterSession>>>,
}

impl VotePipeline {
    /// Creates a new pipeline.
    pub fn new(
        events: Arc<dyn LeafEventSource>,
        registry: Arc<dyn Registry>,
        prover: Arc<dyn VoteProver>,
        store: Arc<dyn LocalStore>,
        config: BallotConfig,
    ) -> Self {
        Self {
            events,
            registry,
            prover,
            store,
            config,
            cache: Mutex::new(TreeCache::new()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Registers the voter of `session`, returning its commitment record.
    ///
    /// The secret material is stored locally before the commitment is sent.
    /// Calling this again after a successful registration returns the
    /// stored record.
    pub async fn register(
        &self,
        session: &VoterSession,
    ) -> Result<CommitmentRecord, Error> {
        let tree = &session.tree;
        let voter = &session.voter;

        let stored = self.store.get_commitment(session).await?;
        if let Some(record) = stored.filter(|r| r.index().is_some()) {
            return Ok(record);
        }

        let registered = self
            .registry
            .has_registered(tree, voter)
            .await
            .map_err(Error::Registry)?;

        if registered {
            // the commitment went through but the index was never stored
            let record = stored.ok_or_else(|| {
                Error::InvalidSecretMaterial(
                    "voter registered without a local commitment".into(),
                )
            })?;
            return self.recover_index(session, record).await;
        }

        let eligible = self
            .registry
            .is_registered_voter(tree, voter)
            .await
            .map_err(Error::Registry)?;
        if !eligible {
            return Err(Error::NotEligible);
        }

        let mut record = match stored {
            Some(record) => record,
            None => {
                let record = CommitmentRecord::generate(&mut OsRng);
                self.store.set_commitment(session, &record).await?;
                record
            }
        };

        let index = self
            .registry
            .insert_commitment(tree, voter, record.commitment())
            .await
            .map_err(|e| {
                if e.is_revert() {
                    Error::RegistrationRejected(e)
                } else {
                    Error::Registry(e)
                }
            })?;

        record.set_index(index);
        self.store.set_commitment(session, &record).await?;

        info!(%session, index, "voter registered");
        Ok(record)
    }

    async fn recover_index(
        &self,
        session: &VoterSession,
        mut record: CommitmentRecord,
    ) -> Result<CommitmentRecord, Error> {
        let events = self
            .events
            .fetch_leaf_events(&session.tree)
            .await
            .map_err(Error::Registry)?;

        let event = events
            .iter()
            .find(|e| e.value == record.commitment())
            .ok_or(HistoryError::MissingLeaf {
                index: events.len() as u64,
                size: events.len() as u64,
            })?;

        record.set_index(event.index);
        self.store.set_commitment(session, &record).await?;

        debug!(%session, index = event.index, "commitment index recovered");
        Ok(record)
    }

    /// Casts `choice` for the voter of `session`.
    ///
    /// Voting twice is not an error: once a vote was counted, any further
    /// call yields [`VoteOutcome::AlreadyVoted`].
    pub async fn cast_vote(
        &self,
        session: &VoterSession,
        choice: u64,
    ) -> Result<VoteOutcome, Error> {
        let _guard = InFlight::acquire(&self.in_flight, session)?;

        if let Some(outcome) = self.previous_outcome(session).await? {
            return Ok(outcome);
        }

        let (record, index) = self.commitment(session).await?;

        let schedule = self
            .registry
            .schedule(&session.tree)
            .await
            .map_err(Error::Registry)?;
        if choice >= schedule.num_options {
            return Err(Error::InvalidChoice {
                choice,
                options: schedule.num_options,
            });
        }

        let path = self
            .config
            .retry_policy()
            .run(|| self.membership_proof(session, &record, index))
            .await?;

        let witness = VoteWitness::new(&record, &path, choice)?;
        let prover = Arc::clone(&self.prover);
        let proof = tokio::task::spawn_blocking(move || prover.prove(&witness))
            .await
            .map_err(|e| Error::ProverTask(e.to_string()))??;

        let nullifier_hash = proof.public.nullifier_hash;
        let encoded = EncodedVote::from(&proof);

        self.store
            .set_vote(
                session,
                &VoteRecord {
                    nullifier_hash,
                    choice,
                    status: VoteStatus::Submitted,
                },
            )
            .await?;

        info!(%session, depth = path.depth, "submitting vote");

        let submission = tokio::time::timeout(
            self.config.submission_timeout(),
            self.registry.submit_vote(&session.tree, &encoded),
        )
        .await;

        match submission {
            Ok(Ok(receipt)) => {
                self.set_status(session, VoteStatus::Confirmed).await?;
                info!(%session, "vote confirmed");
                Ok(VoteOutcome::Confirmed {
                    nullifier_hash,
                    receipt: Some(receipt),
                })
            }
            Ok(Err(RegistryError::NullifierAlreadyUsed)) => {
                if !self.nullifier_used(session, nullifier_hash).await? {
                    self.set_status(session, VoteStatus::Failed).await?;
                    return Err(Error::SubmissionRejected(
                        RegistryError::NullifierAlreadyUsed,
                    ));
                }
                self.set_status(session, VoteStatus::Confirmed).await?;
                info!(%session, "vote already counted");
                Ok(VoteOutcome::AlreadyVoted { nullifier_hash })
            }
            Ok(Err(e)) if e.is_revert() => {
                self.set_status(session, VoteStatus::Failed).await?;
                warn!(%session, error = %e, "vote rejected");
                Err(Error::SubmissionRejected(e))
            }
            Ok(Err(e)) => {
                warn!(%session, error = %e, "vote submission failed");
                self.await_confirmation(session, nullifier_hash).await
            }
            Err(_) => {
                warn!(%session, "vote submission timed out");
                self.await_confirmation(session, nullifier_hash).await
            }
        }
    }

    /// Settles a vote left [`VoteStatus::Submitted`] by an interrupted or
    /// unconfirmed attempt, and returns the status of the stored vote.
    pub async fn resolve(
        &self,
        session: &VoterSession,
    ) -> Result<Option<VoteStatus>, Error> {
        let record = match self.store.get_vote(session).await? {
            Some(record) => record,
            None => return Ok(None),
        };

        if record.status == VoteStatus::Submitted
            && self.nullifier_used(session, record.nullifier_hash).await?
        {
            self.set_status(session, VoteStatus::Confirmed).await?;
            return Ok(Some(VoteStatus::Confirmed));
        }

        Ok(Some(record.status))
    }

    /// Whether a vote was counted for the voter of `session`.
    pub async fn has_voted(
        &self,
        session: &VoterSession,
    ) -> Result<bool, Error> {
        match self.store.get_commitment(session).await? {
            Some(record) => {
                self.nullifier_used(session, record.nullifier_hash()).await
            }
            None => Ok(false),
        }
    }

    // Outcome of an earlier attempt that makes a new one pointless.
    async fn previous_outcome(
        &self,
        session: &VoterSession,
    ) -> Result<Option<VoteOutcome>, Error> {
        let record = match self.store.get_vote(session).await? {
            Some(record) => record,
            None => return Ok(None),
        };
        let nullifier_hash = record.nullifier_hash;

        let counted = match record.status {
            VoteStatus::Confirmed => true,
            // a pending submission gets the whole confirmation window
            // before a new proof is sent
            VoteStatus::Submitted => {
                match self.await_confirmation(session, nullifier_hash).await {
                    Ok(_) => true,
                    Err(Error::SubmissionUnconfirmed { .. }) => {
                        warn!(%session, "earlier submission was not counted");
                        false
                    }
                    Err(e) => return Err(e),
                }
            }
            VoteStatus::Failed => false,
        };

        Ok(counted.then_some(VoteOutcome::AlreadyVoted { nullifier_hash }))
    }

    // Stored commitment record along with its tree position.
    async fn commitment(
        &self,
        session: &VoterSession,
    ) -> Result<(CommitmentRecord, u64), Error> {
        let record =
            self.store.get_commitment(session).await?.ok_or_else(|| {
                Error::InvalidSecretMaterial("no commitment stored".into())
            })?;

        let index = record.index().ok_or_else(|| {
            Error::InvalidSecretMaterial("commitment was never inserted".into())
        })?;

        Ok((record, index))
    }

    async fn membership_proof(
        &self,
        session: &VoterSession,
        record: &CommitmentRecord,
        index: u64,
    ) -> Result<MembershipProof, Error> {
        let events = self
            .events
            .fetch_leaf_events(&session.tree)
            .await
            .map_err(Error::Registry)?;
        validate(&events)?;

        let registry_root = self
            .registry
            .current_root(&session.tree)
            .await
            .map_err(Error::Registry)?;

        let mut cache =
            self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let tree = cache.sync(&session.tree, &events)?;

        match tree.leaf(index) {
            None => {
                return Err(HistoryError::MissingLeaf {
                    index,
                    size: tree.size(),
                }
                .into())
            }
            Some(leaf) if leaf != record.commitment() => {
                return Err(Error::InvalidSecretMaterial(format!(
                    "leaf {index} is not the stored commitment"
                )))
            }
            Some(_) => {}
        }

        if tree.root() != registry_root {
            return Err(HistoryError::StaleRoot.into());
        }

        debug!(
            %session,
            size = tree.size(),
            depth = tree.depth(),
            "membership path rebuilt"
        );

        Ok(tree.generate_proof(index)?)
    }

    async fn nullifier_used(
        &self,
        session: &VoterSession,
        nullifier_hash: BlsScalar,
    ) -> Result<bool, Error> {
        self.registry
            .is_nullifier_used(&session.tree, nullifier_hash)
            .await
            .map_err(Error::Registry)
    }

    async fn set_status(
        &self,
        session: &VoterSession,
        status: VoteStatus,
    ) -> Result<(), Error> {
        if let Some(mut record) = self.store.get_vote(session).await? {
            record.status = status;
            self.store.set_vote(session, &record).await?;
        }
        Ok(())
    }

    // Polls the registry until the vote shows up or the deadline passes.
    async fn await_confirmation(
        &self,
        session: &VoterSession,
        nullifier_hash: BlsScalar,
    ) -> Result<VoteOutcome, Error> {
        let poll = async {
            for delay in self.config.confirmation_backoff() {
                match self.nullifier_used(session, nullifier_hash).await {
                    Ok(true) => return,
                    Ok(false) => {}
                    Err(e) => warn!(%session, error = %e, "confirmation check"),
                }
                tokio::time::sleep(delay).await;
            }
        };

        match tokio::time::timeout(self.config.confirmation_timeout(), poll)
            .await
        {
            Ok(()) => {
                self.set_status(session, VoteStatus::Confirmed).await?;
                info!(%session, "vote confirmed");
                Ok(VoteOutcome::Confirmed {
                    nullifier_hash,
                    receipt: None,
                })
            }
            Err(_) => Err(Error::SubmissionUnconfirmed {
                nullifier_hash: to_hex(&nullifier_hash),
            }),
        }
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Interfaces of the registry holding the membership tree and counting the
//! votes.

use async_trait::async_trait;
use dusk_bls12_381::BlsScalar;
use thiserror::Error;

use crate::encoding::EncodedVote;
use crate::session::{TreeId, VoterId};
use crate::tree::TreeError;

mod memory;

pub use memory::{Clock, InMemoryRegistry, ManualClock, SystemClock};

/// A commitment inserted into a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafEvent {
    /// Position of the leaf.
    pub index: u64,
    /// The commitment.
    pub value: BlsScalar,
}

/// Timing and options of a voting session. Times are unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Registrations are accepted strictly before this instant, votes from
    /// this instant on.
    pub registration_deadline: u64,
    /// Votes are accepted strictly before this instant, if any.
    pub voting_end: Option<u64>,
    /// Amount of options, valid choices are `0..num_options`.
    pub num_options: u64,
}

/// Acknowledgement of a counted vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteReceipt {
    /// Nullifier hash consumed by the vote.
    pub nullifier_hash: BlsScalar,
    /// Option the vote was counted for.
    pub vote: u64,
}

/// Errors raised by a [`Registry`].
///
/// Every variant but [`RegistryError::Unavailable`] is a revert, i.e. an
/// authoritative refusal that will not change by retrying the same call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The caller is not on the allowlist.
    #[error("not allowed to vote")]
    NotAllowedToVote,
    /// The caller already registered a commitment.
    #[error("voter already registered")]
    AlreadyRegistered,
    /// The commitment is already in the tree, the `DuplicateCommitment`
    /// condition of the voting contract.
    #[error("commitment already added")]
    CommitmentAlreadyAdded,
    /// Registrations are closed.
    #[error("registration period is over")]
    RegistrationPeriodOver,
    /// Voting has not started yet.
    #[error("registration period is not over")]
    RegistrationPeriodNotOver,
    /// Voting has ended.
    #[error("voting is closed")]
    VotingClosed,
    /// The vote is not a valid option.
    #[error("invalid option index {vote}, {options} options available")]
    InvalidOptionIndex {
        /// Submitted option.
        vote: u64,
        /// Amount of options.
        options: u64,
    },
    /// The proof does not verify.
    #[error("invalid proof")]
    InvalidProof,
    /// The nullifier hash was already consumed by a vote.
    #[error("nullifier hash already used")]
    NullifierAlreadyUsed,
    /// The proof was generated against another root.
    #[error("root does not match the current tree")]
    RootMismatch,
    /// The proof was generated against another depth.
    #[error("depth does not match the current tree")]
    DepthMismatch,
    /// The tree refused the commitment.
    #[error(transparent)]
    Tree(#[from] TreeError),
    /// No voting session with this identifier.
    #[error("unknown voting session {0}")]
    UnknownTree(TreeId),
    /// The registry could not be reached.
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

impl RegistryError {
    /// Whether the registry refused the call.
    pub fn is_revert(&self) -> bool {
        !matches!(self, Self::Unavailable(_))
    }
}

/// Ordered log of the leaves inserted into a tree.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LeafEventSource: Send + Sync {
    /// Every leaf event of `tree`, in insertion order.
    async fn fetch_leaf_events(
        &self,
        tree: &TreeId,
    ) -> Result<Vec<LeafEvent>, RegistryError>;
}

/// The registry of a voting session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Registry: Send + Sync {
    /// Insert the commitment of `voter` and return its index.
    async fn insert_commitment(
        &self,
        tree: &TreeId,
        voter: &VoterId,
        commitment: BlsScalar,
    ) -> Result<u64, RegistryError>;

    /// Current root, `None` while the tree is empty.
    async fn current_root(
        &self,
        tree: &TreeId,
    ) -> Result<Option<BlsScalar>, RegistryError>;

    /// Current depth.
    async fn current_depth(&self, tree: &TreeId) -> Result<u64, RegistryError>;

    /// Whether `voter` is on the allowlist.
    async fn is_registered_voter(
        &self,
        tree: &TreeId,
        voter: &VoterId,
    ) -> Result<bool, RegistryError>;

    /// Whether `voter` already inserted a commitment.
    async fn has_registered(
        &self,
        tree: &TreeId,
        voter: &VoterId,
    ) -> Result<bool, RegistryError>;

    /// Timing and options of the session.
    async fn schedule(&self, tree: &TreeId) -> Result<Schedule, RegistryError>;

    /// Submit a vote. The registry does not learn who submits it.
    async fn submit_vote(
        &self,
        tree: &TreeId,
        vote: &EncodedVote,
    ) -> Result<VoteReceipt, RegistryError>;

    /// Whether a vote was counted for `nullifier_hash`.
    async fn is_nullifier_used(
        &self,
        tree: &TreeId,
        nullifier_hash: BlsScalar,
    ) -> Result<bool, RegistryError>;
}

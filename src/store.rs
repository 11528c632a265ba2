// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Local persistence of voter state.

use std::collections::HashMap;

use async_trait::async_trait;
use dusk_bls12_381::BlsScalar;
use dusk_bytes::Serializable;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::commitment::{CommitmentRecord, COMMITMENT_RECORD_SIZE};
use crate::session::VoterSession;

/// Errors raised by a [`LocalStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The stored commitment record cannot be decoded.
    #[error("corrupt commitment record for {0}")]
    Corrupt(String),
    /// The backend failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Progress of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteStatus {
    /// Sent to the registry, outcome unknown.
    Submitted,
    /// Counted by the registry.
    Confirmed,
    /// Rejected by the registry.
    Failed,
}

/// What a voter remembers about its vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRecord {
    /// Nullifier hash the vote was cast with.
    pub nullifier_hash: BlsScalar,
    /// Chosen option.
    pub choice: u64,
    /// Progress of the vote.
    pub status: VoteStatus,
}

/// Local key-value persistence of voter state, keyed by session.
///
/// The commitment record holds the voter secrets, implementations must keep
/// it readable only by the owning process.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Stored commitment record, if any.
    async fn get_commitment(
        &self,
        session: &VoterSession,
    ) -> Result<Option<CommitmentRecord>, StoreError>;

    /// Store `record`, replacing any previous one.
    async fn set_commitment(
        &self,
        session: &VoterSession,
        record: &CommitmentRecord,
    ) -> Result<(), StoreError>;

    /// Stored vote record, if any.
    async fn get_vote(
        &self,
        session: &VoterSession,
    ) -> Result<Option<VoteRecord>, StoreError>;

    /// Store `record`, replacing any previous one.
    async fn set_vote(
        &self,
        session: &VoterSession,
        record: &VoteRecord,
    ) -> Result<(), StoreError>;
}

/// [`LocalStore`] living in memory.
///
/// Commitment records are kept in their serialized form so that reading
/// them back goes through the same validation as a persistent backend.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    commitments: Mutex<HashMap<VoterSession, [u8; COMMITMENT_RECORD_SIZE]>>,
    votes: Mutex<HashMap<VoterSession, VoteRecord>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the raw bytes of a commitment record.
    pub async fn set_raw_commitment(
        &self,
        session: &VoterSession,
        bytes: [u8; COMMITMENT_RECORD_SIZE],
    ) {
        self.commitments.lock().await.insert(session.clone(), bytes);
    }
}

#[async_trait]
impl LocalStore for InMemoryStore {
    async fn get_commitment(
        &self,
        session: &VoterSession,
    ) -> Result<Option<CommitmentRecord>, StoreError> {
        let commitments = self.commitments.lock().await;

        commitments
            .get(session)
            .map(|bytes| {
                CommitmentRecord::from_bytes(bytes)
                    .map_err(|_| StoreError::Corrupt(session.to_string()))
            })
            .transpose()
    }

    async fn set_commitment(
        &self,
        session: &VoterSession,
        record: &CommitmentRecord,
    ) -> Result<(), StoreError> {
        self.commitments
            .lock()
            .await
            .insert(session.clone(), record.to_bytes());
        Ok(())
    }

    async fn get_vote(
        &self,
        session: &VoterSession,
    ) -> Result<Option<VoteRecord>, StoreError> {
        Ok(self.votes.lock().await.get(session).cloned())
    }

    async fn set_vote(
        &self,
        session: &VoterSession,
        record: &VoteRecord,
    ) -> Result<(), StoreError> {
        self.votes
            .lock()
            .await
            .insert(session.clone(), record.clone());
        Ok(())
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use thiserror::Error;

use crate::circuit::CircuitError;
use crate::pipeline::HistoryError;
use crate::registry::RegistryError;
use crate::session::VoterSession;
use crate::store::StoreError;
use crate::tree::TreeError;

/// How a caller should react to an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Trying again may succeed.
    Retryable,
    /// Trying again with the same inputs will fail the same way.
    Fatal,
    /// A vote was sent but its fate is unknown. Resolve it, never resubmit.
    Unconfirmed,
}

/// Errors of the voting protocol.
#[derive(Debug, Error)]
pub enum Error {
    /// The local commitment record is missing or corrupt.
    #[error("invalid secret material: {0}")]
    InvalidSecretMaterial(String),
    /// The leaf history is gapped, out of order or lagging behind.
    #[error("inconsistent leaf history: {0}")]
    InconsistentLeafHistory(#[from] HistoryError),
    /// The witness is inconsistent or the prover failed.
    #[error("proof generation failed: {0}")]
    ProofGenerationFailed(#[from] CircuitError),
    /// The registry refused the vote.
    #[error("vote rejected: {0}")]
    SubmissionRejected(RegistryError),
    /// The registry refused the commitment.
    #[error("registration rejected: {0}")]
    RegistrationRejected(RegistryError),
    /// The vote was sent but could not be confirmed in time.
    #[error("vote with nullifier hash {nullifier_hash} is unconfirmed")]
    SubmissionUnconfirmed {
        /// Hex encoded nullifier hash of the pending vote.
        nullifier_hash: String,
    },
    /// Another vote of the same voter is being processed.
    #[error("a vote is already in flight for {0}")]
    VoteInFlight(VoterSession),
    /// The choice is not one of the options.
    #[error("invalid choice {choice}, {options} options available")]
    InvalidChoice {
        /// Requested option.
        choice: u64,
        /// Amount of options.
        options: u64,
    },
    /// The voter is not on the allowlist.
    #[error("voter is not eligible")]
    NotEligible,
    /// A registry query failed.
    #[error("registry error: {0}")]
    Registry(RegistryError),
    /// The local store failed.
    #[error(transparent)]
    Store(StoreError),
    /// The local tree refused an operation.
    #[error(transparent)]
    Tree(#[from] TreeError),
    /// The proving task panicked or was cancelled.
    #[error("prover task failed: {0}")]
    ProverTask(String),
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Corrupt(_) => {
                Error::InvalidSecretMaterial(e.to_string())
            }
            e => Error::Store(e),
        }
    }
}

impl Error {
    /// Classification of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InconsistentLeafHistory(_)
            | Error::VoteInFlight(_)
            | Error::Store(StoreError::Backend(_)) => ErrorKind::Retryable,
            Error::Registry(e) if !e.is_revert() => ErrorKind::Retryable,
            Error::SubmissionUnconfirmed { .. } => ErrorKind::Unconfirmed,
            _ => ErrorKind::Fatal,
        }
    }

    /// Whether trying again may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Retryable
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Membership and vote circuit.
//!
//! A valid proof convinces a verifier that the prover knows a
//! `(nullifier, secret)` pair whose commitment is a leaf of the tree rooted
//! at `root`, that `nullifier_hash` is the hash of that nullifier, and binds
//! `vote` and `depth` to the proof. Nothing links the proof to the leaf.
//!
//! Public inputs are always appended in the order
//! `root, nullifier_hash, vote, depth`.

use dusk_plonk::error::Error as PlonkError;
use dusk_plonk::prelude::*;
use thiserror::Error;

use crate::commitment::{self, CommitmentRecord};
use crate::encoding::{
    from_be_bytes, to_be_bytes, u64_to_word, word_to_u64, EncodingError,
    WORD_SIZE,
};
use crate::hash::{hash_commitment_gadget, hash_one_gadget};
use crate::tree::{compute_path_root, MembershipProof, MAX_DEPTH};

pub mod gadget;
mod keys;

pub use keys::{PlonkVoteProver, PlonkVoteVerifier, VoteKeys};

use gadget::{assert_public, membership_gadget, OpeningWitnesses};

/// Transcript label of the vote circuit.
pub const LABEL: &[u8] = b"dusk-ballot-vote";

/// `log2` of the circuit capacity needed by [`VoteCircuit`].
pub const CAPACITY: usize = 16;

/// Errors raised while proving or verifying a vote.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CircuitError {
    /// The proving system failed.
    #[error("plonk error: {0}")]
    Plonk(String),
    /// The proof does not verify against the given public inputs.
    #[error("invalid proof")]
    InvalidProof,
    /// The proof bytes cannot be decoded.
    #[error("malformed proof bytes")]
    MalformedProof,
    /// The tree is deeper than the circuit supports.
    #[error("depth {depth} exceeds the maximum of {MAX_DEPTH}")]
    DepthTooLarge {
        /// Requested depth.
        depth: u64,
    },
    /// The path has more siblings than the circuit supports.
    #[error("path has {found} siblings, at most {MAX_DEPTH} are supported")]
    TooManySiblings {
        /// Amount of siblings.
        found: usize,
    },
    /// The compact path does not fit in [`MAX_DEPTH`] bits.
    #[error("path index {path} does not fit in {MAX_DEPTH} bits")]
    IndexOutOfRange {
        /// Compact path.
        path: u64,
    },
    /// The commitment of the secrets is not the proven leaf.
    #[error("commitment does not match the proven leaf")]
    CommitmentMismatch,
    /// The nullifier hash does not match the nullifier.
    #[error("nullifier hash does not match the nullifier")]
    NullifierHashMismatch,
    /// The path does not lead to the public root.
    #[error("path does not lead to the public root")]
    RootMismatch,
}

impl From<PlonkError> for CircuitError {
    fn from(e: PlonkError) -> Self {
        Self::Plonk(format!("{e:?}"))
    }
}

/// Public inputs of a vote proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicInputs {
    /// Tree root the membership is proven against.
    pub root: BlsScalar,
    /// Hash of the voter's nullifier.
    pub nullifier_hash: BlsScalar,
    /// Chosen option.
    pub vote: u64,
    /// Depth of the tree.
    pub depth: u64,
}

impl PublicInputs {
    /// Public inputs as field elements, in circuit order.
    pub fn to_scalars(&self) -> [BlsScalar; 4] {
        [
            self.root,
            self.nullifier_hash,
            BlsScalar::from(self.vote),
            BlsScalar::from(self.depth),
        ]
    }

    /// Public inputs as 32-byte big-endian words, in circuit order.
    pub fn to_words(&self) -> [[u8; WORD_SIZE]; 4] {
        [
            to_be_bytes(&self.root),
            to_be_bytes(&self.nullifier_hash),
            u64_to_word(self.vote),
            u64_to_word(self.depth),
        ]
    }

    /// Decode public inputs from 32-byte big-endian words.
    pub fn from_words(
        words: &[[u8; WORD_SIZE]; 4],
    ) -> Result<Self, EncodingError> {
        Ok(Self {
            root: from_be_bytes(&words[0])?,
            nullifier_hash: from_be_bytes(&words[1])?,
            vote: word_to_u64(&words[2])?,
            depth: word_to_u64(&words[3])?,
        })
    }
}

/// A serialized vote proof along with the public inputs it commits to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteProof {
    /// Proof bytes.
    pub proof: Vec<u8>,
    /// Public inputs.
    pub public: PublicInputs,
}

/// Every input of the vote circuit, public and private.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VoteWitness {
    nullifier: BlsScalar,
    secret: BlsScalar,
    path: u64,
    siblings: [BlsScalar; MAX_DEPTH],
    public: PublicInputs,
}

impl core::fmt::Debug for VoteWitness {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VoteWitness")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl VoteWitness {
    /// Assemble the witness of `record` casting `vote`, given the membership
    /// path of its commitment.
    pub fn new(
        record: &CommitmentRecord,
        proof: &MembershipProof,
        vote: u64,
    ) -> Result<Self, CircuitError> {
        if proof.leaf != record.commitment() {
            return Err(CircuitError::CommitmentMismatch);
        }

        let siblings =
            proof
                .padded_siblings()
                .ok_or(CircuitError::TooManySiblings {
                    found: proof.siblings.len(),
                })?;

        Ok(Self {
            nullifier: record.nullifier(),
            secret: record.secret(),
            path: proof.path,
            siblings,
            public: PublicInputs {
                root: proof.root,
                nullifier_hash: record.nullifier_hash(),
                vote,
                depth: proof.depth as u64,
            },
        })
    }

    /// Assemble a witness from raw parts, without any consistency check.
    pub fn from_parts(
        nullifier: BlsScalar,
        secret: BlsScalar,
        path: u64,
        siblings: [BlsScalar; MAX_DEPTH],
        public: PublicInputs,
    ) -> Self {
        Self {
            nullifier,
            secret,
            path,
            siblings,
            public,
        }
    }

    /// Public part of the witness.
    pub fn public(&self) -> &PublicInputs {
        &self.public
    }

    /// Checks the statement outside of the circuit.
    ///
    /// A witness passing this check always yields a valid proof.
    pub fn check(&self) -> Result<(), CircuitError> {
        let depth = self.public.depth;
        if depth > MAX_DEPTH as u64 {
            return Err(CircuitError::DepthTooLarge { depth });
        }
        if self.path >> MAX_DEPTH != 0 {
            return Err(CircuitError::IndexOutOfRange { path: self.path });
        }
        if commitment::nullifier_hash(self.nullifier)
            != self.public.nullifier_hash
        {
            return Err(CircuitError::NullifierHashMismatch);
        }

        let leaf = commitment::commitment(self.nullifier, self.secret);
        let root =
            compute_path_root(leaf, self.path, &self.siblings, depth as usize);
        if root != self.public.root {
            return Err(CircuitError::RootMismatch);
        }

        Ok(())
    }
}

/// The vote circuit.
#[derive(Debug, Default, Clone, Copy)]
pub struct VoteCircuit {
    nullifier: BlsScalar,
    secret: BlsScalar,
    path: u64,
    siblings: [BlsScalar; MAX_DEPTH],
    root: BlsScalar,
    nullifier_hash: BlsScalar,
    vote: u64,
    depth: u64,
}

impl From<&VoteWitness> for VoteCircuit {
    fn from(w: &VoteWitness) -> Self {
        Self {
            nullifier: w.nullifier,
            secret: w.secret,
            path: w.path,
            siblings: w.siblings,
            root: w.public.root,
            nullifier_hash: w.public.nullifier_hash,
            vote: w.public.vote,
            depth: w.public.depth,
        }
    }
}

impl Circuit for VoteCircuit {
    fn circuit<C>(&self, composer: &mut C) -> Result<(), PlonkError>
    where
        C: Composer,
    {
        let nullifier = composer.append_witness(self.nullifier);
        let secret = composer.append_witness(self.secret);
        let leaf = hash_commitment_gadget(composer, nullifier, secret);

        let mut siblings = [C::ZERO; MAX_DEPTH];
        siblings
            .iter_mut()
            .zip(self.siblings.iter())
            .for_each(|(w, s)| *w = composer.append_witness(*s));

        let opening = OpeningWitnesses {
            path: composer.append_witness(BlsScalar::from(self.path)),
            siblings,
            depth: composer.append_witness(BlsScalar::from(self.depth)),
        };

        let root = membership_gadget(composer, leaf, &opening);
        assert_public(composer, root, self.root);

        let nullifier_hash = hash_one_gadget(composer, nullifier);
        assert_public(composer, nullifier_hash, self.nullifier_hash);

        // the option index is only bound, the registry checks its range
        let vote = composer.append_witness(BlsScalar::from(self.vote));
        assert_public(composer, vote, BlsScalar::from(self.vote));

        assert_public(composer, opening.depth, BlsScalar::from(self.depth));

        Ok(())
    }
}

/// Produces vote proofs.
///
/// Proving is CPU bound and blocking, callers in an async context should run
/// it on a dedicated thread.
#[cfg_attr(test, mockall::automock)]
pub trait VoteProver: Send + Sync {
    /// Prove `witness`, failing without output if the statement does not
    /// hold.
    fn prove(&self, witness: &VoteWitness) -> Result<VoteProof, CircuitError>;
}

/// Verifies vote proofs.
#[cfg_attr(test, mockall::automock)]
pub trait ProofVerifier: Send + Sync {
    /// Verify `proof` against `public`.
    fn verify(
        &self,
        proof: &[u8],
        public: &PublicInputs,
    ) -> Result<(), CircuitError>;
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Voter secret material and its public commitment.

use core::fmt;

use dusk_bls12_381::BlsScalar;
use dusk_bytes::{Error as BytesError, Serializable};
use rand_core::{CryptoRng, OsRng, RngCore};

use crate::encoding::{from_be_bytes, to_be_bytes, WORD_SIZE};
use crate::hash::{hash_commitment, hash_one};

/// Size of a serialized [`CommitmentRecord`].
pub const COMMITMENT_RECORD_SIZE: usize = 3 * WORD_SIZE + 1 + 8;

/// Public commitment of a `(nullifier, secret)` pair.
pub fn commitment(nullifier: BlsScalar, secret: BlsScalar) -> BlsScalar {
    hash_commitment(nullifier, secret)
}

/// Public, one-way image of a nullifier.
pub fn nullifier_hash(nullifier: BlsScalar) -> BlsScalar {
    hash_one(nullifier)
}

/// Secret material of a voter along with the commitment it produces.
///
/// The nullifier and the secret never leave the voter: only
/// [`CommitmentRecord::commitment`] and [`CommitmentRecord::nullifier_hash`]
/// are ever published.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CommitmentRecord {
    nullifier: BlsScalar,
    secret: BlsScalar,
    commitment: BlsScalar,
    index: Option<u64>,
}

impl CommitmentRecord {
    /// Create a record from existing secret material.
    pub fn new(nullifier: BlsScalar, secret: BlsScalar) -> Self {
        Self {
            nullifier,
            secret,
            commitment: commitment(nullifier, secret),
            index: None,
        }
    }

    /// Sample fresh secret material from `rng`.
    pub fn generate<R>(rng: &mut R) -> Self
    where
        R: RngCore + CryptoRng,
    {
        loop {
            let record =
                Self::new(BlsScalar::random(rng), BlsScalar::random(rng));

            // zero is the padding sentinel of the tree
            if record.commitment != BlsScalar::zero() {
                return record;
            }
        }
    }

    /// Sample fresh secret material from the operating system.
    pub fn random() -> Self {
        Self::generate(&mut OsRng)
    }

    /// Secret nullifier.
    pub fn nullifier(&self) -> BlsScalar {
        self.nullifier
    }

    /// Secret trapdoor.
    pub fn secret(&self) -> BlsScalar {
        self.secret
    }

    /// Leaf value inserted into the tree.
    pub fn commitment(&self) -> BlsScalar {
        self.commitment
    }

    /// Hash published alongside the vote.
    pub fn nullifier_hash(&self) -> BlsScalar {
        nullifier_hash(self.nullifier)
    }

    /// Tree position, once the commitment was inserted.
    pub fn index(&self) -> Option<u64> {
        self.index
    }

    /// Record the tree position assigned at insertion.
    pub fn set_index(&mut self, index: u64) {
        self.index = Some(index);
    }

    /// Same record with the tree position set.
    pub fn with_index(mut self, index: u64) -> Self {
        self.set_index(index);
        self
    }
}

impl fmt::Debug for CommitmentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitmentRecord")
            .field("nullifier", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("commitment", &self.commitment)
            .field("index", &self.index)
            .finish()
    }
}

impl Serializable<COMMITMENT_RECORD_SIZE> for CommitmentRecord {
    type Error = BytesError;

    /// Decode a record and check that the stored commitment matches the
    /// secret material.
    fn from_bytes(bytes: &[u8; Self::SIZE]) -> Result<Self, Self::Error> {
        let word = |i: usize| -> Result<BlsScalar, Self::Error> {
            let mut w = [0u8; WORD_SIZE];
            w.copy_from_slice(&bytes[i * WORD_SIZE..(i + 1) * WORD_SIZE]);
            from_be_bytes(&w).map_err(|_| BytesError::InvalidData)
        };

        let stored = word(0)?;
        let mut record = Self::new(word(1)?, word(2)?);
        if record.commitment != stored {
            return Err(BytesError::InvalidData);
        }

        let mut index = [0u8; 8];
        index.copy_from_slice(&bytes[3 * WORD_SIZE + 1..]);
        record.index = match bytes[3 * WORD_SIZE] {
            0 => None,
            1 => Some(u64::from_le_bytes(index)),
            _ => return Err(BytesError::InvalidData),
        };

        Ok(record)
    }

    fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];

        [self.commitment, self.nullifier, self.secret]
            .iter()
            .enumerate()
            .for_each(|(i, s)| {
                bytes[i * WORD_SIZE..(i + 1) * WORD_SIZE]
                    .copy_from_slice(&to_be_bytes(s));
            });

        if let Some(index) = self.index {
            bytes[3 * WORD_SIZE] = 1;
            bytes[3 * WORD_SIZE + 1..].copy_from_slice(&index.to_le_bytes());
        }

        bytes
    }
}

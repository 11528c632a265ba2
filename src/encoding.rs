// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Wire encoding shared with the on-chain verifier.
//!
//! Field elements travel as 32-byte big-endian words. A vote submission is
//! the ABI encoding of `vote(bytes,bytes32,bytes32,bytes32,bytes32)`, i.e.
//! the proof as a dynamic byte string followed by the four public inputs in
//! circuit order.

use dusk_bls12_381::BlsScalar;
use dusk_bytes::Serializable;
use thiserror::Error;

use crate::circuit::{PublicInputs, VoteProof};

/// Size in bytes of an encoded field element.
pub const WORD_SIZE: usize = 32;

// head: offset of the proof + the four public inputs
const HEAD_WORDS: usize = 5;

/// Errors raised while decoding wire data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// The value is not the canonical encoding of a field element.
    #[error("value is not a canonical field element")]
    NonCanonical,
    /// A buffer had an unexpected length.
    #[error("invalid length: expected {expected} bytes, found {found}")]
    InvalidLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        found: usize,
    },
    /// The input is not valid hexadecimal.
    #[error("invalid hex string")]
    InvalidHex,
    /// A word does not fit the integer it should carry.
    #[error("word does not fit in 64 bits")]
    ValueTooLarge,
    /// The ABI layout is malformed.
    #[error("malformed ABI payload: {0}")]
    MalformedAbi(&'static str),
}

/// Encode a scalar as a 32-byte big-endian word.
pub fn to_be_bytes(scalar: &BlsScalar) -> [u8; WORD_SIZE] {
    let mut bytes = scalar.to_bytes();
    bytes.reverse();
    bytes
}

/// Decode a 32-byte big-endian word into a scalar, rejecting values that are
/// not reduced modulo the field order.
pub fn from_be_bytes(
    bytes: &[u8; WORD_SIZE],
) -> Result<BlsScalar, EncodingError> {
    let mut le = *bytes;
    le.reverse();
    <BlsScalar as Serializable<WORD_SIZE>>::from_bytes(&le)
        .map_err(|_| EncodingError::NonCanonical)
}

/// Encode an integer as a 32-byte big-endian word.
pub fn u64_to_word(value: u64) -> [u8; WORD_SIZE] {
    let mut word = [0u8; WORD_SIZE];
    word[WORD_SIZE - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Decode an integer from a 32-byte big-endian word.
pub fn word_to_u64(word: &[u8; WORD_SIZE]) -> Result<u64, EncodingError> {
    if word[..WORD_SIZE - 8].iter().any(|b| *b != 0) {
        return Err(EncodingError::ValueTooLarge);
    }
    let mut value = [0u8; 8];
    value.copy_from_slice(&word[WORD_SIZE - 8..]);
    Ok(u64::from_be_bytes(value))
}

/// `0x`-prefixed hexadecimal representation of a scalar.
pub fn to_hex(scalar: &BlsScalar) -> String {
    format!("0x{}", hex::encode(to_be_bytes(scalar)))
}

/// Parse a scalar from its hexadecimal representation. The `0x` prefix is
/// optional and shorter inputs are left-padded with zeroes.
pub fn from_hex(s: &str) -> Result<BlsScalar, EncodingError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.len() > 2 * WORD_SIZE {
        return Err(EncodingError::InvalidLength {
            expected: WORD_SIZE,
            found: (digits.len() + 1) / 2,
        });
    }
    let padded = format!("{digits:0>64}");
    let mut word = [0u8; WORD_SIZE];
    hex::decode_to_slice(padded, &mut word)
        .map_err(|_| EncodingError::InvalidHex)?;
    from_be_bytes(&word)
}

fn word_at(buf: &[u8], word: usize) -> Result<[u8; WORD_SIZE], EncodingError> {
    word.checked_mul(WORD_SIZE)
        .and_then(|start| buf.get(start..start.checked_add(WORD_SIZE)?))
        .and_then(|w| w.try_into().ok())
        .ok_or(EncodingError::MalformedAbi("truncated word"))
}

/// A vote as submitted to the registry: the serialized proof and the public
/// inputs, each as a fixed-width big-endian word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedVote {
    /// Proof bytes, as serialized by the proving system.
    pub proof: Vec<u8>,
    /// Tree root the proof was generated against.
    pub root: [u8; WORD_SIZE],
    /// Public nullifier hash.
    pub nullifier_hash: [u8; WORD_SIZE],
    /// Chosen option.
    pub vote: [u8; WORD_SIZE],
    /// Tree depth the proof was generated against.
    pub depth: [u8; WORD_SIZE],
}

impl From<&VoteProof> for EncodedVote {
    fn from(proof: &VoteProof) -> Self {
        let [root, nullifier_hash, vote, depth] = proof.public.to_words();
        Self {
            proof: proof.proof.clone(),
            root,
            nullifier_hash,
            vote,
            depth,
        }
    }
}

impl EncodedVote {
    /// Decode the public inputs carried by this vote.
    pub fn public_inputs(&self) -> Result<PublicInputs, EncodingError> {
        PublicInputs::from_words(&[
            self.root,
            self.nullifier_hash,
            self.vote,
            self.depth,
        ])
    }

    /// ABI encoding of the call arguments.
    pub fn to_abi_bytes(&self) -> Vec<u8> {
        let padded_len = self.proof.len().div_ceil(WORD_SIZE) * WORD_SIZE;
        let mut buf =
            Vec::with_capacity((HEAD_WORDS + 1) * WORD_SIZE + padded_len);

        buf.extend_from_slice(&u64_to_word((HEAD_WORDS * WORD_SIZE) as u64));
        buf.extend_from_slice(&self.root);
        buf.extend_from_slice(&self.nullifier_hash);
        buf.extend_from_slice(&self.vote);
        buf.extend_from_slice(&self.depth);

        buf.extend_from_slice(&u64_to_word(self.proof.len() as u64));
        buf.extend_from_slice(&self.proof);
        buf.resize((HEAD_WORDS + 1) * WORD_SIZE + padded_len, 0);

        buf
    }

    /// Decode the ABI encoding produced by [`EncodedVote::to_abi_bytes`].
    pub fn from_abi_bytes(buf: &[u8]) -> Result<Self, EncodingError> {
        let offset = word_to_u64(&word_at(buf, 0)?)? as usize;
        if offset % WORD_SIZE != 0 || offset < HEAD_WORDS * WORD_SIZE {
            return Err(EncodingError::MalformedAbi("invalid bytes offset"));
        }

        let len = word_to_u64(&word_at(buf, offset / WORD_SIZE)?)? as usize;
        let start = offset + WORD_SIZE;
        let end = start
            .checked_add(len)
            .ok_or(EncodingError::MalformedAbi("invalid proof length"))?;
        let proof = buf
            .get(start..end)
            .ok_or(EncodingError::MalformedAbi("truncated proof"))?
            .to_vec();

        Ok(Self {
            proof,
            root: word_at(buf, 1)?,
            nullifier_hash: word_at(buf, 2)?,
            vote: word_at(buf, 3)?,
            depth: word_at(buf, 4)?,
        })
    }
}

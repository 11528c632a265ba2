// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Fixed-length Poseidon hashing over the `Hades` permutation.
//!
//! All functions follow the same construction: the capacity element of the
//! state is set to a tag encoding the arity of the input and its domain, the
//! input is added into the rate and the state is permuted once. The digest is
//! the first rate element.
//!
//! Voter commitments and tree nodes are both two-input hashes, but they live
//! in distinct domains: a node of the tree can never be opened as a leaf.
//!
//! The in-circuit mirrors live in [`gadget`] and must produce the same
//! values, otherwise proofs generated off-chain will never verify.

use dusk_bls12_381::BlsScalar;
use dusk_hades::{ScalarStrategy, Strategy, WIDTH};

mod gadget;

pub use gadget::{hash_commitment_gadget, hash_one_gadget, hash_two_gadget};

// Domain separators. The low bits are the bitmask of the inputs that are
// present, bit 16 marks a leaf commitment.
pub(crate) const NULLIFIER_DOMAIN: u32 = 0b1;
pub(crate) const NODE_DOMAIN: u32 = 0b11;
pub(crate) const COMMITMENT_DOMAIN: u32 = (1 << 16) | 0b11;

// Computes the tag from the arity and the domain. Output length is set to 1.
// Encoding:
// first 16 bits is set to arity with the MSB set to 1
// next 16 bits is set to 1 (our output length)
// last 32 bits are set to the domain separator
pub(crate) fn tag(arity: usize, dom_sep: u32) -> u64 {
    let mut tag: u64 = 1 << 15;
    tag |= arity as u64;
    tag <<= 16;

    tag |= 1;
    tag <<= 32;

    tag | dom_sep as u64
}

fn fixed_hash<const A: usize>(
    dom_sep: u32,
    messages: &[BlsScalar; A],
) -> BlsScalar {
    let mut h = ScalarStrategy::new();

    let mut state = [BlsScalar::zero(); WIDTH];
    state[0] = BlsScalar::from(tag(A, dom_sep));

    messages.chunks(WIDTH - 1).for_each(|chunk| {
        state[1..].iter_mut().zip(chunk.iter()).for_each(|(s, c)| {
            *s += c;
        });
        h.perm(&mut state);
    });

    state[1]
}

/// One-input hash, used to derive the public nullifier hash.
pub fn hash_one(x: BlsScalar) -> BlsScalar {
    fixed_hash(NULLIFIER_DOMAIN, &[x])
}

/// Two-input hash of the tree nodes.
///
/// The function is not symmetric: `hash_two(a, b) != hash_two(b, a)` for
/// `a != b`, which is what makes the left/right position of a node part of
/// the membership statement.
pub fn hash_two(a: BlsScalar, b: BlsScalar) -> BlsScalar {
    fixed_hash(NODE_DOMAIN, &[a, b])
}

/// Two-input hash of a voter commitment, the leaves of the tree.
pub fn hash_commitment(nullifier: BlsScalar, secret: BlsScalar) -> BlsScalar {
    fixed_hash(COMMITMENT_DOMAIN, &[nullifier, secret])
}

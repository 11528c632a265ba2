// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

#![warn(missing_docs)]

//! Anonymous voting over a Poseidon incremental Merkle tree.
//!
//! A voter registers a commitment `H(nullifier, secret)` in the
//! [`MembershipTree`](tree::MembershipTree) of a voting session. To vote,
//! they prove in zero knowledge that they know the opening of one of the
//! leaves, and reveal only the nullifier hash `H(nullifier)` that prevents
//! them from voting twice.
//!
//! - [`hash`] holds the Poseidon hashes and their circuit gadgets.
//! - [`tree`] is the lean incremental Merkle tree and its membership
//!   proofs.
//! - [`circuit`] defines the vote statement and its PLONK prover and
//!   verifier.
//! - [`registry`] describes the registry holding the tree and counting
//!   the votes, with an in-memory implementation.
//! - [`pipeline`] drives a vote from the stored secrets to its
//!   confirmation.

pub mod circuit;
pub mod commitment;
pub mod config;
pub mod encoding;
pub mod hash;
pub mod pipeline;
pub mod registry;
pub mod session;
pub mod store;
pub mod tree;

mod error;

pub use dusk_bls12_381::BlsScalar;
pub use error::{Error, ErrorKind};
pub use tree::MAX_DEPTH;

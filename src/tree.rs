// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Append-only binary Merkle tree with dynamic depth.
//!
//! Every level keeps its nodes explicitly. A node without a right sibling is
//! promoted unchanged to the next level instead of being hashed with a
//! filler, so the depth of the tree is always the smallest `d` such that
//! `2^d >= size`, and an insertion only touches the nodes on the path of the
//! new leaf.

mod proof;


pub use proof::{compute_path_root, MembershipProof};

use dusk_bls12_381::BlsScalar;
use thiserror::Error;

use crate::hash::hash_two;

/// Maximum depth supported by the membership circuit.
pub const MAX_DEPTH: usize = 16;

/// Maximum amount of leaves a tree may hold.
pub const MAX_LEAVES: u64 = 1 << MAX_DEPTH;

/// Errors raised by [`MembershipTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeError {
    /// The tree no longer accepts insertions.
    #[error("the tree is frozen")]
    Frozen,
    /// Zero is reserved as the padding sentinel of membership paths.
    #[error("leaf cannot be zero")]
    ZeroLeaf,
    /// The tree reached [`MAX_LEAVES`].
    #[error("the tree is full ({MAX_LEAVES} leaves)")]
    Full,
    /// The tree holds no leaf.
    #[error("the tree is empty")]
    Empty,
    /// No leaf at the requested index.
    #[error("index {index} is out of range for a tree of size {size}")]
    IndexOutOfRange {
        /// Requested index.
        index: u64,
        /// Current amount of leaves.
        size: u64,
    },
}

/// Lifecycle of a tree during a voting session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeState {
    /// No leaf inserted yet.
    Empty,
    /// Insertions are allowed.
    Growing,
    /// Read-only, the registration window is closed.
    Frozen,
}

/// Incremental Merkle tree of voter commitments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipTree {
    // nodes[0] holds the leaves, nodes[depth] holds the root
    nodes: Vec<Vec<BlsScalar>>,
    frozen: bool,
}

impl Default for MembershipTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MembershipTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self {
            nodes: vec![Vec::new()],
            frozen: false,
        }
    }

    /// Builds a tree by inserting `leaves` in order.
    pub fn from_leaves<I>(leaves: I) -> Result<Self, TreeError>
    where
        I: IntoIterator<Item = BlsScalar>,
    {
        let mut tree = Self::new();
        tree.insert_many(leaves)?;
        Ok(tree)
    }

    /// Amount of leaves in the tree.
    pub fn size(&self) -> u64 {
        self.nodes[0].len() as u64
    }

    /// Current depth. A tree with zero or one leaf has depth `0`.
    pub fn depth(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Current root, or `None` for an empty tree.
    pub fn root(&self) -> Option<BlsScalar> {
        self.nodes[self.depth()].first().copied()
    }

    /// All leaves, in insertion order.
    pub fn leaves(&self) -> &[BlsScalar] {
        &self.nodes[0]
    }

    /// Leaf at `index`, if any.
    pub fn leaf(&self, index: u64) -> Option<BlsScalar> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.nodes[0].get(i))
            .copied()
    }

    /// Position of `leaf` in the tree, if present.
    pub fn index_of(&self, leaf: &BlsScalar) -> Option<u64> {
        self.nodes[0]
            .iter()
            .position(|l| l == leaf)
            .map(|i| i as u64)
    }

    /// Whether `leaf` has been inserted.
    pub fn contains(&self, leaf: &BlsScalar) -> bool {
        self.index_of(leaf).is_some()
    }

    /// Lifecycle state of the tree.
    pub fn state(&self) -> TreeState {
        match (self.frozen, self.nodes[0].is_empty()) {
            (true, _) => TreeState::Frozen,
            (false, true) => TreeState::Empty,
            (false, false) => TreeState::Growing,
        }
    }

    /// Stops accepting insertions. There is no way back.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Appends `leaf` and returns its index.
    pub fn insert(&mut self, leaf: BlsScalar) -> Result<u64, TreeError> {
        if self.frozen {
            return Err(TreeError::Frozen);
        }
        if leaf == BlsScalar::zero() {
            return Err(TreeError::ZeroLeaf);
        }

        let index = self.size();
        if index >= MAX_LEAVES {
            return Err(TreeError::Full);
        }

        // one more level as soon as the leaves don't fit anymore
        if (1u64 << self.depth()) < index + 1 {
            self.nodes.push(Vec::new());
        }

        let depth = self.depth();
        let mut node = leaf;
        let mut pos = index as usize;

        for level in self.nodes[..depth].iter_mut() {
            if pos == level.len() {
                level.push(node);
            } else {
                level[pos] = node;
            }

            if pos & 1 == 1 {
                node = hash_two(level[pos - 1], node);
            }

            pos >>= 1;
        }

        self.nodes[depth] = vec![node];

        Ok(index)
    }

    /// Appends every leaf of `leaves`, in order.
    pub fn insert_many<I>(&mut self, leaves: I) -> Result<(), TreeError>
    where
        I: IntoIterator<Item = BlsScalar>,
    {
        leaves
            .into_iter()
            .try_for_each(|leaf| self.insert(leaf).map(|_| ()))
    }

    /// Membership path of the leaf at `index`.
    ///
    /// Levels where the node was promoted have no sibling and contribute
    /// neither a sibling nor a direction bit, see [`MembershipProof`].
    pub fn generate_proof(
        &self,
        index: u64,
    ) -> Result<MembershipProof, TreeError> {
        let root = self.root().ok_or(TreeError::Empty)?;
        let leaf = self.leaf(index).ok_or(TreeError::IndexOutOfRange {
            index,
            size: self.size(),
        })?;

        let mut siblings = Vec::with_capacity(self.depth());
        let mut path = 0u64;
        let mut pos = index as usize;

        for level in &self.nodes[..self.depth()] {
            let is_right = pos & 1 == 1;
            let sibling = if is_right { pos - 1 } else { pos + 1 };

            if let Some(sibling) = level.get(sibling) {
                path |= (is_right as u64) << siblings.len();
                siblings.push(*sibling);
            }

            pos >>= 1;
        }

        Ok(MembershipProof {
            root,
            leaf,
            leaf_index: index,
            path,
            depth: self.depth(),
            siblings,
        })
    }
}

/// Root of the tree built from `leaves`, computed level by level without any
/// incremental state.
pub fn compute_root(leaves: &[BlsScalar]) -> Option<BlsScalar> {
    let mut level = leaves.to_vec();

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_two(*left, *right),
                [node] => *node,
                _ => unreachable!("chunks of two"),
            })
            .collect();
    }

    level.first().copied()
}

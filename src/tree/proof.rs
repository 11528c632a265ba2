// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use dusk_bls12_381::BlsScalar;

use super::MAX_DEPTH;
use crate::hash::hash_two;

/// Membership path of a leaf.
///
/// The path is compact: only levels where the leaf's ancestor has a sibling
/// contribute an entry to `siblings`, and bit `i` of `path` tells whether
/// the ancestor is the right child at the `i`-th such level. Promoted levels
/// leave no trace.
///
/// The circuit consumes a fixed amount of [`MAX_DEPTH`] siblings, so
/// [`MembershipProof::padded_siblings`] pads the compact path with zeroes.
/// Zero is never a valid node, which makes it a safe "no level" marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipProof {
    /// Root of the tree the path was extracted from.
    pub root: BlsScalar,
    /// The proven leaf.
    pub leaf: BlsScalar,
    /// Position of the leaf in the tree.
    pub leaf_index: u64,
    /// Direction bits of the compact path, least significant bit first.
    pub path: u64,
    /// Depth of the tree the path was extracted from.
    pub depth: usize,
    /// Siblings from the leaf level up.
    pub siblings: Vec<BlsScalar>,
}

impl MembershipProof {
    /// Siblings padded with zeroes up to [`MAX_DEPTH`] entries.
    ///
    /// Returns `None` if the path is longer than [`MAX_DEPTH`].
    pub fn padded_siblings(&self) -> Option<[BlsScalar; MAX_DEPTH]> {
        if self.siblings.len() > MAX_DEPTH {
            return None;
        }

        let mut padded = [BlsScalar::zero(); MAX_DEPTH];
        padded[..self.siblings.len()].copy_from_slice(&self.siblings);

        Some(padded)
    }

    /// Recompute the root from the path and compare it to [`Self::root`].
    pub fn verify(&self) -> bool {
        compute_path_root(self.leaf, self.path, &self.siblings, self.depth)
            == self.root
    }
}

/// Fold a compact path into a root.
///
/// Level `i` is processed only if `i < depth` and the `i`-th sibling is
/// non-zero, the same rule the membership circuit enforces.
pub fn compute_path_root(
    leaf: BlsScalar,
    path: u64,
    siblings: &[BlsScalar],
    depth: usize,
) -> BlsScalar {
    siblings
        .iter()
        .enumerate()
        .take(depth.min(MAX_DEPTH))
        .filter(|(_, sibling)| **sibling != BlsScalar::zero())
        .fold(leaf, |node, (i, sibling)| {
            if (path >> i) & 1 == 1 {
                hash_two(*sibling, node)
            } else {
                hash_two(node, *sibling)
            }
        })
}

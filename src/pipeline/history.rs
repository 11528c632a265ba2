// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::HashMap;

use dusk_bls12_381::BlsScalar;
use thiserror::Error;

use crate::registry::LeafEvent;
use crate::session::TreeId;
use crate::tree::{MembershipTree, TreeError};

/// Reasons for a leaf history to be unusable. All of them are expected to
/// go away by fetching the history again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// The indices do not form a contiguous run from zero.
    #[error("expected leaf {expected}, found leaf {found}")]
    Gap {
        /// Index expected at this position.
        expected: u64,
        /// Index found instead.
        found: u64,
    },
    /// A leaf is the zero padding value.
    #[error("leaf {index} is zero")]
    ZeroLeaf {
        /// Position of the leaf.
        index: u64,
    },
    /// The history does not reach the voter's own leaf yet.
    #[error("leaf {index} is missing, history has {size} leaves")]
    MissingLeaf {
        /// Position of the missing leaf.
        index: u64,
        /// Amount of leaves in the history.
        size: u64,
    },
    /// The rebuilt root is not the registry root.
    #[error("rebuilt root does not match the registry root")]
    StaleRoot,
}

/// Checks that `events` are exactly the leaves `0..events.len()`, in order.
pub fn validate(events: &[LeafEvent]) -> Result<(), HistoryError> {
    events
        .iter()
        .zip(0u64..)
        .try_for_each(|(event, expected)| {
            if event.index != expected {
                return Err(HistoryError::Gap {
                    expected,
                    found: event.index,
                });
            }
            if event.value == BlsScalar::zero() {
                return Err(HistoryError::ZeroLeaf { index: expected });
            }
            Ok(())
        })
}

/// Trees rebuilt from leaf histories, kept between proving attempts.
///
/// A new history extending the cached one only costs the insertion of the
/// new leaves. Any other history replaces the cached tree.
#[derive(Debug, Default)]
pub struct TreeCache {
    trees: HashMap<TreeId, MembershipTree>,
}

impl TreeCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring the tree of `id` in line with `events` and return it.
    ///
    /// `events` must have gone through [`validate`].
    pub fn sync(
        &mut self,
        id: &TreeId,
        events: &[LeafEvent],
    ) -> Result<&MembershipTree, TreeError> {
        let tree = self.trees.entry(id.clone()).or_default();

        let cached = tree.leaves();
        let extends = cached.len() <= events.len()
            && cached.iter().zip(events).all(|(l, e)| *l == e.value);

        if !extends {
            *tree = MembershipTree::new();
        }

        let known = tree.size() as usize;
        tree.insert_many(events[known..].iter().map(|e| e.value))?;

        Ok(tree)
    }

    /// Cached amount of leaves for `id`.
    pub fn size(&self, id: &TreeId) -> Option<u64> {
        self.trees.get(id).map(MembershipTree::size)
    }
}

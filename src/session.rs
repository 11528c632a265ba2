// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Identifiers of voting sessions and voters.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a voting session, i.e. of one membership tree.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TreeId(pub String);

/// Identifier of a voter, e.g. the address it registers from.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct VoterId(pub String);

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TreeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<&str> for VoterId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A voter taking part in one voting session.
///
/// Every piece of local state is scoped to this pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VoterSession {
    /// The voting session.
    pub tree: TreeId,
    /// The voter.
    pub voter: VoterId,
}

impl VoterSession {
    /// Creates a new session context.
    pub fn new(tree: impl Into<TreeId>, voter: impl Into<VoterId>) -> Self {
        Self {
            tree: tree.into(),
            voter: voter.into(),
        }
    }
}

impl fmt::Display for VoterSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tree, self.voter)
    }
}

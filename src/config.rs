// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Tunables of the vote pipeline.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::pipeline::{Backoff, RetryPolicy};

/// Prefix of the environment variables overriding the configuration, e.g.
/// `BALLOT_FETCH_ATTEMPTS=5`.
pub const ENV_PREFIX: &str = "BALLOT";

/// Configuration of a [`VotePipeline`](crate::pipeline::VotePipeline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BallotConfig {
    /// Attempts at fetching a consistent leaf history.
    pub fetch_attempts: u8,
    /// Delay before the first retry of a fetch.
    pub retry_delay_ms: u64,
    /// Multiplier applied to the delay after every retry.
    pub retry_backoff: u32,
    /// Upper bound of any retry or polling delay.
    pub retry_max_delay_ms: u64,
    /// Time given to the registry to answer a vote submission.
    pub submission_timeout_ms: u64,
    /// Time given to a submitted vote to show up in the registry.
    pub confirmation_timeout_ms: u64,
    /// First interval between two confirmation checks.
    pub confirmation_poll_ms: u64,
}

impl Default for BallotConfig {
    fn default() -> Self {
        Self {
            fetch_attempts: 3,
            retry_delay_ms: 500,
            retry_backoff: 2,
            retry_max_delay_ms: 8_000,
            submission_timeout_ms: 60_000,
            confirmation_timeout_ms: 30_000,
            confirmation_poll_ms: 4_000,
        }
    }
}

impl BallotConfig {
    /// Load the configuration from an optional file, then from the
    /// environment. Missing values keep their default.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()
    }

    /// Retry policy of the leaf history fetch.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.fetch_attempts.max(1),
            delay: Duration::from_millis(self.retry_delay_ms),
            backoff: self.retry_backoff.max(1),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    /// Intervals between two confirmation checks.
    pub fn confirmation_backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.confirmation_poll_ms),
            self.retry_backoff.max(1),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }

    /// Deadline of a vote submission.
    pub fn submission_timeout(&self) -> Duration {
        Duration::from_millis(self.submission_timeout_ms)
    }

    /// Deadline of the confirmation of a submitted vote.
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }
}

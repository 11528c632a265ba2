// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::Error;

/// Geometric sequence of delays, capped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    next: Duration,
    factor: u32,
    max: Duration,
}

impl Backoff {
    /// Delays starting at `initial`, multiplied by `factor` each step and
    /// never above `max`.
    pub fn new(initial: Duration, factor: u32, max: Duration) -> Self {
        Self {
            next: initial.min(max),
            factor,
            max,
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = current
            .checked_mul(self.factor)
            .unwrap_or(self.max)
            .min(self.max);
        Some(current)
    }
}

/// Policy for retrying the operations that fail with a retryable error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included.
    pub attempts: u8,
    /// Delay before the first retry.
    pub delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff: u32,
    /// Upper bound of the delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn never() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
            backoff: 1,
            max_delay: Duration::ZERO,
        }
    }

    /// Delays between two attempts.
    pub fn delays(&self) -> Backoff {
        Backoff::new(self.delay, self.backoff, self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non retryable error, or the
    /// attempts are exhausted.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut delays = self.delays();
        let mut attempt = 0;

        loop {
            attempt += 1;

            match op().await {
                Ok(t) => return Ok(t),
                Err(e) if !e.is_retryable() || attempt >= self.attempts => {
                    return Err(e)
                }
                Err(e) => {
                    let delay = delays.next().unwrap_or(self.max_delay);
                    warn!(attempt, ?delay, error = %e, "retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(500),
            backoff: 2,
            max_delay: Duration::from_secs(8),
        }
    }
}

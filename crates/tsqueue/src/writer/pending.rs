/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! In-flight batch accounting.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::transport::{BatchCallbacks, BatchDescriptor};
use crate::error::WriteError;

/// How often [`PendingBatches::drain`] reports progress.
const DRAIN_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Count of submissions whose outcome has not been observed yet.
///
/// Incremented once per submission before the transport is called,
/// decremented exactly once by a success or terminal error callback and left
/// alone by retries.
#[derive(Debug, Default)]
pub struct PendingBatches {
    count: Mutex<usize>,
}

impl PendingBatches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of pending submissions.
    pub fn count(&self) -> usize {
        *self.count.lock()
    }

    pub(crate) fn submit(&self) {
        *self.count.lock() += 1;
    }

    /// Releases one submission. Used by callbacks and when a submission fails
    /// before reaching the transport.
    pub(crate) fn release(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
    }

    /// Waits until no submissions are pending.
    ///
    /// Returns `true` immediately when nothing is pending, otherwise polls
    /// every `poll_interval` and gives up with `false` after `timeout`.
    pub async fn drain(&self, timeout: Duration, poll_interval: Duration) -> bool {
        if self.count() == 0 {
            return true;
        }

        let start = Instant::now();
        let mut last_log = start;
        loop {
            let pending = self.count();
            if pending == 0 {
                debug!("All batches drained after {:?}", start.elapsed());
                return true;
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                warn!(
                    "Timed out after {:?} waiting for batches to drain; {} batches still pending",
                    timeout, pending
                );
                return false;
            }
            if last_log.elapsed() >= DRAIN_LOG_INTERVAL {
                info!(
                    "Waiting for {} pending batches to drain ({:.0}s elapsed)",
                    pending,
                    elapsed.as_secs_f64()
                );
                last_log = Instant::now();
            }
            tokio::time::sleep(poll_interval.min(timeout - elapsed)).await;
        }
    }
}

impl BatchCallbacks for PendingBatches {
    fn success(&self, batch: &BatchDescriptor) {
        self.release();
        debug!(
            "Written batch of {} rows to {}.{}",
            batch.rows, batch.database, batch.table
        );
    }

    fn error(&self, batch: &BatchDescriptor, _data: &str, cause: &WriteError) {
        self.release();
        warn!(
            "Cannot write batch of {} rows to {}.{} after {} attempts: {}",
            batch.rows, batch.database, batch.table, batch.attempt, cause
        );
    }

    fn retry(&self, batch: &BatchDescriptor, _data: &str, cause: &WriteError) {
        debug!(
            "Retryable error for batch of {} rows to {}.{} (attempt {}): {}",
            batch.rows, batch.database, batch.table, batch.attempt, cause
        );
    }
}

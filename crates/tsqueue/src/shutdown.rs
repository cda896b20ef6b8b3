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

//! Cooperative shutdown signal.
//!
//! The daemon's running flag is read by the poll loop and written by the OS
//! signal task, so it is an atomic shared behind an `Arc` together with a
//! [`Notify`] that wakes sleepers as soon as shutdown is requested.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Granularity at which interruptible sleeps re-check the flag.
pub const SLEEP_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// A cloneable, one-shot shutdown flag.
///
/// Clones share state: triggering any clone is observed by all of them.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    triggered: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    /// Creates a signal in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown and wakes every waiter.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Convenience inverse of [`is_triggered`](Self::is_triggered).
    pub fn is_running(&self) -> bool {
        !self.is_triggered()
    }

    /// Sleeps for `duration` unless shutdown is requested first.
    ///
    /// The sleep is broken into [`SLEEP_CHECK_INTERVAL`] slices and also wakes
    /// immediately on [`trigger`](Self::trigger). Returns `true` if the full
    /// duration elapsed and `false` if it was interrupted.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            if self.is_triggered() {
                return false;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return true;
            }
            let slice = (deadline - now).min(SLEEP_CHECK_INTERVAL);

            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_triggered() {
                return false;
            }

            tokio::select! {
                _ = tokio::time::sleep(slice) => {}
                _ = notified => return false,
            }
        }
    }
}

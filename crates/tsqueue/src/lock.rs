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

//! Distributed mutual exclusion over the shared store.
//!
//! A lock is a single key, `{namespace}:lock:{name}`, created with an atomic
//! "set if absent, with expiry". Holding the key means holding the lock. The
//! TTL is the crash-safety mechanism: a holder that dies without releasing
//! simply lets the key expire.
//!
//! Locks are non-reentrant and release is unconditional. A failed acquire is
//! not an error: another process most likely already performed the guarded
//! action, so callers should re-check shared state before deciding to fail.
//!
//! ```rust,ignore
//! let lock = DistributedLock::new(store, "schwab");
//! if lock.acquire("token_refresh", Duration::from_secs(10), Duration::from_millis(200), 25).await {
//!     refresh_token().await?;
//!     lock.release("token_refresh").await;
//! } else if !token_is_fresh().await? {
//!     return Err(anyhow!("token refresh is held elsewhere and the token is stale"));
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::shutdown::ShutdownSignal;
use crate::store::KeyValueStore;

/// Mutual-exclusion primitive keyed by name within a namespace.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    holder: String,
}

impl DistributedLock {
    /// Creates a lock client for `namespace`.
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            holder: format!("pid-{}", std::process::id()),
        }
    }

    /// The namespace this client operates in.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Store key backing the lock `name`.
    pub fn key(&self, name: &str) -> String {
        format!("{}:lock:{}", self.namespace, name)
    }

    /// Makes exactly one acquisition attempt.
    pub async fn try_acquire(&self, name: &str, ttl: Duration) -> bool {
        let key = self.key(name);
        match self.store.set_if_absent(&key, &self.holder, ttl).await {
            Ok(true) => {
                debug!("Acquired lock {} (ttl {:?})", key, ttl);
                true
            }
            Ok(false) => {
                debug!("Lock {} is held elsewhere", key);
                false
            }
            Err(e) => {
                warn!("Failed to acquire lock {}: {}", key, e);
                false
            }
        }
    }

    /// Attempts to acquire `name`, retrying up to `max_retries` attempts in
    /// total with `retry_interval` between them.
    ///
    /// Never sleeps after the final attempt and never blocks indefinitely.
    /// A `max_retries` of zero still makes one attempt.
    pub async fn acquire(
        &self,
        name: &str,
        ttl: Duration,
        retry_interval: Duration,
        max_retries: u32,
    ) -> bool {
        self.acquire_inner(name, ttl, retry_interval, max_retries, None)
            .await
    }

    /// Like [`acquire`](Self::acquire) but gives up as soon as `shutdown` is
    /// triggered between attempts.
    pub async fn acquire_cancellable(
        &self,
        name: &str,
        ttl: Duration,
        retry_interval: Duration,
        max_retries: u32,
        shutdown: &ShutdownSignal,
    ) -> bool {
        self.acquire_inner(name, ttl, retry_interval, max_retries, Some(shutdown))
            .await
    }

    async fn acquire_inner(
        &self,
        name: &str,
        ttl: Duration,
        retry_interval: Duration,
        max_retries: u32,
        shutdown: Option<&ShutdownSignal>,
    ) -> bool {
        let attempts = max_retries.max(1);
        for attempt in 1..=attempts {
            if self.try_acquire(name, ttl).await {
                return true;
            }
            if attempt == attempts {
                break;
            }
            match shutdown {
                Some(signal) => {
                    if !signal.sleep(retry_interval).await {
                        debug!("Gave up on lock {} after shutdown request", name);
                        return false;
                    }
                }
                None => tokio::time::sleep(retry_interval).await,
            }
        }
        debug!(
            "Could not acquire lock {} after {} attempts",
            self.key(name),
            attempts
        );
        false
    }

    /// Deletes the lock key unconditionally.
    ///
    /// Returns whether a key was actually removed; `false` means the lock had
    /// already expired or was never held.
    pub async fn release(&self, name: &str) -> bool {
        let key = self.key(name);
        match self.store.delete(&key).await {
            Ok(removed) => {
                if removed {
                    debug!("Released lock {}", key);
                } else {
                    warn!("Lock {} was not held at release", key);
                }
                removed
            }
            Err(e) => {
                warn!("Failed to release lock {}: {}", key, e);
                false
            }
        }
    }
}

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

//! Shared key-value store abstraction.
//!
//! The queue and the lock only need a handful of primitives from the shared
//! store: an atomic conditional set with expiry, plain TTL'd values, and a
//! list with push-tail/pop-head semantics. The [`KeyValueStore`] trait exposes
//! exactly those so that backends can be swapped:
//!
//! - [`RedisStore`]: production backend over a Redis connection manager
//! - [`MemoryStore`]: process-local backend for tests and dry runs

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

/// Primitive operations against the shared store.
///
/// All operations are single-key and individually atomic. No cross-key
/// transaction is offered, which is why a two-step enqueue is not crash-safe.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Sets `key` to `value` with expiry only if the key does not exist.
    ///
    /// Returns `true` when the key was set.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, StoreError>;

    /// Unconditionally sets `key` to `value` with expiry.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Reads a value, `None` if missing or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Deletes a key, returning whether a key was actually removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Appends to the tail of a list, returning the new list length.
    async fn push_tail(&self, key: &str, value: &str) -> Result<usize, StoreError>;

    /// Pops from the head of a list without blocking.
    async fn pop_head(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Length of a list, zero if missing.
    async fn list_len(&self, key: &str) -> Result<usize, StoreError>;

    /// Inclusive range of list entries starting at the head.
    async fn list_range(&self, key: &str, start: usize, stop: usize)
        -> Result<Vec<String>, StoreError>;
}

/// Converts a TTL to whole seconds, rejecting anything below one second.
pub(crate) fn ttl_seconds(key: &str, ttl: Duration) -> Result<u64, StoreError> {
    match ttl.as_secs() {
        0 => Err(StoreError::InvalidTtl {
            key: key.to_string(),
        }),
        secs => Ok(secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_seconds_rejects_sub_second() {
        assert!(matches!(
            ttl_seconds("k", Duration::from_millis(500)),
            Err(StoreError::InvalidTtl { .. })
        ));
        assert_eq!(ttl_seconds("k", Duration::from_secs(30)).unwrap(), 30);
    }
}

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

//! Durable FIFO queue of item identifiers with TTL'd JSON payloads.
//!
//! Each logical queue is two kinds of keys under the broker namespace:
//!
//! - `{ns}:{queue}:pending`: list of item ids, push-tail / pop-head
//! - `{ns}:{queue}:data:{item_id}`: the JSON payload, bound by a TTL
//!
//! Dequeueing only pops the id; the payload stays until the consumer calls
//! [`DurableQueue::delete_data`] after terminal processing. An id whose
//! payload is gone (expired, or overwritten by a duplicate enqueue and then
//! deleted) is a ghost and reads back as `None`.
//!
//! # Guarantees
//!
//! Best-effort at-least-once. An id popped by a consumer that then crashes is
//! lost: there is no visibility timeout and no redelivery. Enqueue is two
//! independent writes with a best-effort rollback, so a crash between them
//! can leave an orphaned payload that simply expires.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::QueueError;
use crate::store::KeyValueStore;

/// Default payload TTL for producers that do not choose one.
pub const DEFAULT_ITEM_TTL: Duration = Duration::from_secs(3600);

/// Snapshot of a queue for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    /// Number of pending item ids.
    pub size: usize,
    /// Ids at the head of the queue.
    pub sample_items: Vec<String>,
    /// `(item_id, ticker)` for the first few sampled payloads still present.
    pub sample_tickers: Vec<(String, Option<String>)>,
}

/// A namespaced queue broker over a [`KeyValueStore`].
#[derive(Clone)]
pub struct DurableQueue {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
}

impl DurableQueue {
    /// Creates a broker for `namespace`.
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// The key namespace of this broker.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Key of the pending id list for `queue`.
    pub fn pending_key(&self, queue: &str) -> String {
        format!("{}:{}:pending", self.namespace, queue)
    }

    /// Key of the payload for `item_id` in `queue`.
    pub fn data_key(&self, queue: &str, item_id: &str) -> String {
        format!("{}:{}:data:{}", self.namespace, queue, item_id)
    }

    /// Stores `payload` under a TTL and appends `item_id` to the pending list.
    ///
    /// Returns `Ok(false)` when either store write fails. If the payload was
    /// written but the push fails, the payload key is deleted as a
    /// best-effort rollback. Only a payload that cannot be serialized is an
    /// `Err`.
    pub async fn enqueue<T>(
        &self,
        queue: &str,
        item_id: &str,
        payload: &T,
        ttl: Duration,
    ) -> Result<bool, QueueError>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_string(payload).map_err(|source| QueueError::Encode {
            item_id: item_id.to_string(),
            source,
        })?;
        let data_key = self.data_key(queue, item_id);
        let pending_key = self.pending_key(queue);

        if let Err(e) = self.store.set_with_ttl(&data_key, &body, ttl).await {
            error!("Failed to store data for {}: {}", item_id, e);
            return Ok(false);
        }

        match self.store.push_tail(&pending_key, item_id).await {
            Ok(length) if length > 0 => {
                debug!(
                    "Enqueued {} to {} (queue size: {})",
                    item_id, queue, length
                );
                Ok(true)
            }
            outcome => {
                match outcome {
                    Err(e) => error!("Failed to add {} to pending queue: {}", item_id, e),
                    Ok(_) => error!("Failed to add {} to pending queue", item_id),
                }
                if let Err(e) = self.store.delete(&data_key).await {
                    warn!("Rollback of payload {} failed: {}", data_key, e);
                }
                Ok(false)
            }
        }
    }

    /// Pops the next item id from the head of `queue`.
    ///
    /// `None` means the queue is drained right now, not that it will stay
    /// empty.
    pub async fn dequeue(&self, queue: &str) -> Result<Option<String>, QueueError> {
        let item_id = self.store.pop_head(&self.pending_key(queue)).await?;
        if let Some(id) = &item_id {
            debug!("Dequeued {} from {}", id, queue);
        }
        Ok(item_id)
    }

    /// Reads the payload of `item_id`, `None` if missing or expired.
    pub async fn get_data(
        &self,
        queue: &str,
        item_id: &str,
    ) -> Result<Option<serde_json::Value>, QueueError> {
        self.get_data_as(queue, item_id).await
    }

    /// Reads and deserializes the payload of `item_id` into `T`.
    pub async fn get_data_as<T: DeserializeOwned>(
        &self,
        queue: &str,
        item_id: &str,
    ) -> Result<Option<T>, QueueError> {
        let raw = match self.store.get(&self.data_key(queue, item_id)).await? {
            Some(raw) => raw,
            None => {
                warn!("No data found for {}", item_id);
                return Ok(None);
            }
        };
        let value = serde_json::from_str(&raw).map_err(|source| QueueError::Decode {
            item_id: item_id.to_string(),
            source,
        })?;
        debug!("Retrieved data for {}", item_id);
        Ok(Some(value))
    }

    /// Deletes the payload of `item_id`, marking the item done.
    pub async fn delete_data(&self, queue: &str, item_id: &str) -> Result<bool, QueueError> {
        let removed = self.store.delete(&self.data_key(queue, item_id)).await?;
        if removed {
            debug!("Deleted data for {}", item_id);
        } else {
            warn!("No data to delete for {}", item_id);
        }
        Ok(removed)
    }

    /// Number of pending ids in `queue`.
    pub async fn size(&self, queue: &str) -> Result<usize, QueueError> {
        Ok(self.store.list_len(&self.pending_key(queue)).await?)
    }

    /// Up to `count` ids from the head of `queue`, without removing them.
    pub async fn peek(&self, queue: &str, count: usize) -> Result<Vec<String>, QueueError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        Ok(self
            .store
            .list_range(&self.pending_key(queue), 0, count - 1)
            .await?)
    }

    /// Size, head ids and the tickers of the first `sample` payloads.
    pub async fn status(&self, queue: &str, sample: usize) -> Result<QueueStatus, QueueError> {
        let size = self.size(queue).await?;
        let sample_items = self.peek(queue, 10).await?;

        let mut sample_tickers = Vec::new();
        for item_id in sample_items.iter().take(sample) {
            // Undecodable payloads are still worth listing in a diagnostic.
            let ticker = match self.get_data(queue, item_id).await {
                Ok(Some(value)) => value
                    .get("ticker")
                    .and_then(|t| t.as_str())
                    .map(str::to_string),
                Ok(None) => continue,
                Err(QueueError::Decode { .. }) => None,
                Err(e) => return Err(e),
            };
            sample_tickers.push((item_id.clone(), ticker));
        }

        Ok(QueueStatus {
            size,
            sample_items,
            sample_tickers,
        })
    }
}

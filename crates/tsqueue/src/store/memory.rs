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

//! In-process store backend.
//!
//! Expiry is evaluated lazily against `tokio::time::Instant`, so tests running
//! under a paused clock can advance past a TTL deterministically.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

use super::{ttl_seconds, KeyValueStore};
use crate::error::StoreError;

#[derive(Debug, Clone)]
enum Slot {
    Text(String),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// A [`KeyValueStore`] held entirely in memory.
///
/// Mirrors the Redis semantics the pipeline relies on: conditional set with
/// expiry, TTL'd values, and lists that disappear once emptied.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys, ignoring expired ones.
    pub fn key_count(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    /// Whether a live key exists.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    fn purge_expired(entries: &mut HashMap<String, Entry>, key: &str) {
        let now = Instant::now();
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let secs = ttl_seconds(key, ttl)?;
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, key);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Text(value.to_string()),
                expires_at: Some(Instant::now() + Duration::from_secs(secs)),
            },
        );
        Ok(true)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let secs = ttl_seconds(key, ttl)?;
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                slot: Slot::Text(value.to_string()),
                expires_at: Some(Instant::now() + Duration::from_secs(secs)),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, key);
        match entries.get(key) {
            None => Ok(None),
            Some(Entry {
                slot: Slot::Text(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, key);
        Ok(entries.remove(key).is_some())
    }

    async fn push_tail(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::List(VecDeque::new()),
            expires_at: None,
        });
        match &mut entry.slot {
            Slot::List(list) => {
                list.push_back(value.to_string());
                Ok(list.len())
            }
            Slot::Text(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    async fn pop_head(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, key);
        let (popped, now_empty) = match entries.get_mut(key) {
            None => return Ok(None),
            Some(Entry {
                slot: Slot::List(list),
                ..
            }) => {
                let popped = list.pop_front();
                (popped, list.is_empty())
            }
            Some(_) => {
                return Err(StoreError::WrongType {
                    key: key.to_string(),
                })
            }
        };
        // Redis drops a list once its last element is popped.
        if now_empty {
            entries.remove(key);
        }
        Ok(popped)
    }

    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, key);
        match entries.get(key) {
            None => Ok(0),
            Some(Entry {
                slot: Slot::List(list),
                ..
            }) => Ok(list.len()),
            Some(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    async fn list_range(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<String>, StoreError> {
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, key);
        match entries.get(key) {
            None => Ok(Vec::new()),
            Some(Entry {
                slot: Slot::List(list),
                ..
            }) => {
                if start > stop {
                    return Ok(Vec::new());
                }
                Ok(list
                    .iter()
                    .skip(start)
                    .take(stop - start + 1)
                    .cloned()
                    .collect())
            }
            Some(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
        }
    }
}

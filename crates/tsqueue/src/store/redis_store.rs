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

//! Redis store backend.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::debug;

use super::{ttl_seconds, KeyValueStore};
use crate::config::RedisSettings;
use crate::error::StoreError;

/// A [`KeyValueStore`] backed by Redis.
///
/// Uses a multiplexed [`ConnectionManager`] which reconnects transparently,
/// so the store is cheap to clone and share across tasks.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connects to the Redis server described by `settings`.
    pub async fn connect(settings: &RedisSettings) -> Result<Self, StoreError> {
        let client = redis::Client::open(settings.url())?;
        let manager = ConnectionManager::new(client).await?;
        debug!(
            "Connected to Redis at {}:{} (db {})",
            settings.host, settings.port, settings.db
        );
        Ok(Self { manager })
    }

    /// Wraps an existing connection manager.
    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let secs = ttl_seconds(key, ttl)?;
        let mut conn = self.manager.clone();
        // SET key value NX EX ttl replies OK when set and nil otherwise.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(secs)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let secs = ttl_seconds(key, ttl)?;
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(key, value, secs).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.manager.clone();
        Ok(conn.get(key).await?)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.manager.clone();
        let removed: usize = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn push_tail(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        let mut conn = self.manager.clone();
        Ok(conn.rpush(key, value).await?)
    }

    async fn pop_head(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.manager.clone();
        Ok(conn.lpop(key, None::<NonZeroUsize>).await?)
    }

    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        let mut conn = self.manager.clone();
        Ok(conn.llen(key).await?)
    }

    async fn list_range(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<String>, StoreError> {
        let mut conn = self.manager.clone();
        let start = isize::try_from(start).unwrap_or(isize::MAX);
        let stop = isize::try_from(stop).unwrap_or(isize::MAX);
        Ok(conn.lrange(key, start, stop).await?)
    }
}

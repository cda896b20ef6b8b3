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

//! Implementation of the `lock` command.
//!
//! Acquires a lock, optionally holds it, then releases it. Useful for
//! checking that a lock is free or for blocking a guarded action by hand.

use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use tracing::{info, warn};
use tsqueue::config::RedisSettings;
use tsqueue::DistributedLock;

use super::{connect_store, parse_duration};

const RETRY_INTERVAL: Duration = Duration::from_millis(200);

pub async fn run(name: &str, ttl: &str, hold: &str, attempts: u32, namespace: &str) -> Result<()> {
    let ttl = parse_duration(ttl).with_context(|| format!("Invalid ttl: '{}'", ttl))?;
    let hold = parse_duration(hold).with_context(|| format!("Invalid hold: '{}'", hold))?;
    if ttl.is_zero() {
        return Err(anyhow!("Lock ttl must be at least one second"));
    }

    let store = connect_store(&RedisSettings::from_env()).await?;
    let lock = DistributedLock::new(store, namespace);
    let key = lock.key(name);

    if !lock.acquire(name, ttl, RETRY_INTERVAL, attempts).await {
        return Err(anyhow!("Lock {} is held elsewhere", key));
    }
    info!("Acquired {} (ttl {:?})", key, ttl);

    if !hold.is_zero() {
        if hold > ttl {
            warn!("Holding {} for {:?}, longer than its ttl", key, hold);
        }
        tokio::time::sleep(hold).await;
    }

    if lock.release(name).await {
        info!("Released {}", key);
    } else {
        warn!("{} had already expired", key);
    }
    Ok(())
}

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

//! Implementation of the `enqueue` command.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use std::io::Read;
use std::path::Path;
use tracing::info;
use tsqueue::config::RedisSettings;
use tsqueue::DurableQueue;

use super::{connect_store, parse_duration};

pub async fn run(queue: &str, id: &str, file: &Path, ttl: &str, namespace: &str) -> Result<()> {
    let ttl = parse_duration(ttl).with_context(|| format!("Invalid ttl: '{}'", ttl))?;
    if ttl.is_zero() {
        bail!("Payload ttl must be at least one second");
    }
    let payload = read_payload(file)?;

    let store = connect_store(&RedisSettings::from_env()).await?;
    let broker = DurableQueue::new(store, namespace);
    let enqueued = broker
        .enqueue(queue, id, &payload, ttl)
        .await
        .with_context(|| format!("Failed to enqueue {}", id))?;
    if !enqueued {
        return Err(anyhow!("Store rejected {} for queue '{}'", id, queue));
    }

    let size = broker.size(queue).await.unwrap_or_default();
    info!(
        "Enqueued {} to {}:{} (ttl {:?}, queue size {})",
        id, namespace, queue, ttl, size
    );
    Ok(())
}

/// Reads a JSON document from `path`, or from stdin when `path` is "-".
fn read_payload(path: &Path) -> Result<Value> {
    let content = if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read payload from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read payload file {}", path.display()))?
    };
    serde_json::from_str(&content).context("Payload is not valid JSON")
}

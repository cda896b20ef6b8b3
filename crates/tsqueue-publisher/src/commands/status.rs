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

//! Implementation of the `status` command.

use anyhow::{Context, Result};
use tsqueue::config::RedisSettings;
use tsqueue::queue::QueueStatus;
use tsqueue::{DurableQueue, QueueKind};

use super::connect_store;

pub async fn run(queues: &[String], namespace: &str, sample: usize) -> Result<()> {
    let store = connect_store(&RedisSettings::from_env()).await?;
    let broker = DurableQueue::new(store, namespace);

    let names: Vec<String> = if queues.is_empty() {
        QueueKind::ALL.iter().map(|k| k.name().to_string()).collect()
    } else {
        queues.to_vec()
    };

    for name in &names {
        let status = broker
            .status(name, sample)
            .await
            .with_context(|| format!("Failed to read status of queue '{}'", name))?;
        print!("{}", render(namespace, name, &status));
    }
    Ok(())
}

fn render(namespace: &str, queue: &str, status: &QueueStatus) -> String {
    let mut out = format!("{}:{}: {} pending\n", namespace, queue, status.size);
    if !status.sample_items.is_empty() {
        out.push_str(&format!("  head: {}\n", status.sample_items.join(", ")));
    }
    for (item_id, ticker) in &status.sample_tickers {
        out.push_str(&format!(
            "  {} -> ticker {}\n",
            item_id,
            ticker.as_deref().unwrap_or("<none>")
        ));
    }
    out
}

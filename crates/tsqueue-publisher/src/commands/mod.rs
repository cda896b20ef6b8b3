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

//! Subcommand implementations and the helpers they share.

pub mod enqueue;
pub mod lock;
pub mod run;
pub mod status;

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tsqueue::config::RedisSettings;
use tsqueue::store::RedisStore;
use tsqueue::KeyValueStore;

/// Connects to the Redis server named by `REDIS_HOST`, `REDIS_PORT`,
/// `REDIS_DB` and `REDIS_PASSWORD`.
pub(crate) async fn connect_store(settings: &RedisSettings) -> Result<Arc<dyn KeyValueStore>> {
    let store = RedisStore::connect(settings).await.with_context(|| {
        format!(
            "Failed to connect to Redis at {}:{} (db {})",
            settings.host, settings.port, settings.db
        )
    })?;
    Ok(Arc::new(store))
}

/// Parses durations like "90s", "30m", "1h" or "1d2h" into a `Duration`.
///
/// Units are `d`, `h`, `m` and `s`; a bare number is rejected.
pub(crate) fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return Err(anyhow!("Duration string cannot be empty"));
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if digits.is_empty() {
            return Err(anyhow!(
                "Invalid duration format: expected number before '{}'",
                c
            ));
        }
        let value: u64 = digits
            .parse()
            .with_context(|| format!("Invalid number in duration: {}", digits))?;
        digits.clear();

        let unit = match c {
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            _ => return Err(anyhow!("Unknown duration unit: '{}'. Use d, h, m, or s", c)),
        };
        total = value
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| anyhow!("Duration '{}' is too large", s))?;
    }

    if !digits.is_empty() {
        return Err(anyhow!(
            "Duration '{}' is missing a unit. Use d (days), h (hours), m (minutes), or s (seconds)",
            s
        ));
    }

    Ok(Duration::from_secs(total))
}

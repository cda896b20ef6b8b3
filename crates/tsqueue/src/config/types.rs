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

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Top-level publisher configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublisherConfig {
    pub queues: Vec<QueueConfig>,
    #[serde(default)]
    pub redis: RedisSettings,
    #[serde(default)]
    pub influx: InfluxSettings,
    /// Upper bound on waiting for in-flight batches at shutdown.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

/// One logical queue and the write policy of its writer.
///
/// Intervals are milliseconds except `poll_interval`, which is seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
    pub name: String,
    pub table: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: f64,
    #[serde(default = "default_flush_interval")]
    pub flush_interval: u64,
    #[serde(default = "default_jitter_interval")]
    pub jitter_interval: u64,
    #[serde(default = "default_retry_interval")]
    pub retry_interval: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: i64,
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay: u64,
    #[serde(default = "default_exponential_base")]
    pub exponential_base: u32,
    /// Overrides the routing table's batch size. Rejected for protected queues
    /// unless it equals the fixed value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<i64>,
}

/// Shared key-value store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedisSettings {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default = "default_redis_db")]
    pub db: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Time-series server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InfluxSettings {
    #[serde(default = "default_influx_url")]
    pub url: String,
    #[serde(default = "default_influx_token", skip_serializing)]
    pub token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl QueueConfig {
    /// A queue entry with every optional setting at its default.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            namespace: default_namespace(),
            poll_interval: default_poll_interval(),
            flush_interval: default_flush_interval(),
            jitter_interval: default_jitter_interval(),
            retry_interval: default_retry_interval(),
            max_retries: default_max_retries(),
            max_retry_delay: default_max_retry_delay(),
            exponential_base: default_exponential_base(),
            batch_size: None,
        }
    }

    /// Idle sleep between poll cycles.
    pub fn poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.poll_interval)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_poll_interval()))
    }
}

impl PublisherConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl RedisSettings {
    /// Reads `REDIS_HOST`, `REDIS_PORT` and `REDIS_DB`.
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Connection URL understood by the `redis` crate.
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

impl InfluxSettings {
    /// Reads `INFLUXDB3_HTTP_BIND_ADDR` and `INFLUXDB3_AUTH_TOKEN`.
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            db: default_redis_db(),
            password: env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
        }
    }
}

impl Default for InfluxSettings {
    fn default() -> Self {
        Self {
            url: default_influx_url(),
            token: default_influx_token(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_namespace() -> String {
    "queue".to_string()
}

fn default_poll_interval() -> f64 {
    2.0
}

fn default_flush_interval() -> u64 {
    10_000
}

fn default_jitter_interval() -> u64 {
    2_000
}

fn default_retry_interval() -> u64 {
    15_000
}

fn default_max_retries() -> i64 {
    5
}

fn default_max_retry_delay() -> u64 {
    30_000
}

fn default_exponential_base() -> u32 {
    2
}

fn default_drain_timeout_secs() -> u64 {
    30
}

fn default_redis_host() -> String {
    env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string())
}

fn default_redis_port() -> u16 {
    env::var("REDIS_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(6379)
}

fn default_redis_db() -> i64 {
    env::var("REDIS_DB")
        .ok()
        .and_then(|d| d.parse().ok())
        .unwrap_or(0)
}

fn default_influx_url() -> String {
    let addr = env::var("INFLUXDB3_HTTP_BIND_ADDR").unwrap_or_else(|_| "localhost:8181".to_string());
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr
    } else {
        format!("http://{}", addr)
    }
}

fn default_influx_token() -> Option<String> {
    env::var("INFLUXDB3_AUTH_TOKEN").ok().filter(|t| !t.is_empty())
}

fn default_request_timeout_secs() -> u64 {
    30
}

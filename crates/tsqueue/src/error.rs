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

//! Error types for the ingestion pipeline.
//!
//! Each layer owns its own error enum:
//!
//! - [`StoreError`]: failures talking to the shared key-value store
//! - [`QueueError`]: queue operations (store failures plus payload codec failures)
//! - [`ValidationError`]: payloads that cannot be ingested and are dropped
//! - [`WriteError`]: batch configuration and time-series transport failures
//! - [`DaemonError`]: startup and lifecycle failures of the ingestion daemon
//!
//! Configuration errors live in [`crate::config::ConfigError`].

use thiserror::Error;

use crate::config::ConfigError;
use crate::daemon::DaemonState;

/// Errors raised by a [`crate::store::KeyValueStore`] backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[cfg(feature = "redis")]
    #[error("Redis command failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Invalid TTL for key '{key}': must be at least one second")]
    InvalidTtl { key: String },

    #[error("Operation against a key holding the wrong kind of value: {key}")]
    WrongType { key: String },

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Errors raised by [`crate::queue::DurableQueue`] operations.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to serialize payload for item '{item_id}': {source}")]
    Encode {
        item_id: String,
        source: serde_json::Error,
    },

    #[error("Failed to deserialize payload for item '{item_id}': {source}")]
    Decode {
        item_id: String,
        source: serde_json::Error,
    },
}

/// A payload that cannot be ingested.
///
/// Items failing validation are deleted and counted as failed; they are never
/// retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Payload is missing the 'ticker' field")]
    MissingTicker,

    #[error("Payload has neither a 'candles' nor a 'data' body")]
    MissingBody,

    #[error("Payload body contains no rows")]
    EmptyBody,

    #[error("Payload body has an empty or missing 'datetime' column")]
    EmptyDatetime,

    #[error("Payload has an invalid shape: {message}")]
    InvalidShape { message: String },

    #[error("Column '{column}' has {actual} values but 'datetime' has {expected}")]
    ColumnLength {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid timestamp at row {index}: {value}")]
    InvalidTimestamp { index: usize, value: String },
}

/// Errors raised by batch configuration and write transports.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WriteError {
    #[error("Invalid batch write configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Failed to encode rows for table '{table}': {message}")]
    Encode { table: String, message: String },

    #[error("Time-series transport error: {0}")]
    Transport(String),

    #[error("Time-series server responded with status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Writer for database '{database}' is closed")]
    Closed { database: String },
}

impl WriteError {
    /// Whether the failure is worth retrying with backoff.
    ///
    /// Transport failures, throttling (429) and server errors (5xx) are
    /// transient; everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            WriteError::Transport(_) => true,
            WriteError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Errors raised by the [`crate::daemon::IngestionDaemon`].
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Writer error: {0}")]
    Write(#[from] WriteError),

    #[error("Unknown queue '{0}'")]
    UnknownQueue(String),

    #[error("Invalid daemon state transition from {from:?} to {to:?}")]
    InvalidTransition { from: DaemonState, to: DaemonState },
}

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

//! # tsqueue
//!
//! Durable, Redis-backed buffering of time-series events and batched
//! republishing into a time-series database.
//!
//! Producers (market data fetchers, fundamentals jobs, backtest runs) push
//! JSON payloads into a [`DurableQueue`]. The [`IngestionDaemon`] polls each
//! configured queue, validates and normalizes the payloads, resolves the
//! output table and tag columns, and hands the rows to a [`BatchedWriter`]
//! which flushes them asynchronously with retry and backoff.
//!
//! ```text
//! producer ──enqueue──▶ DurableQueue ──dequeue──▶ IngestionDaemon
//!                                                  │ validate / normalize / route
//!                                                  ▼
//!                                            BatchedWriter ──▶ time-series store
//! ```
//!
//! A [`DistributedLock`] built on the same store is available for short
//! cross-process critical sections. It has no data-flow dependency on the
//! rest of the pipeline.
//!
//! ## Delivery guarantees
//!
//! Delivery is best-effort at-least-once from the producer's point of view
//! and at-most-once from the queue's point of view: once an item is popped it
//! is removed regardless of whether the write succeeds. There is no
//! visibility timeout, redelivery or dead-letter queue.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tsqueue::config::ConfigLoader;
//! use tsqueue::daemon::{IngestionDaemon, MemoryWriterFactory};
//! use tsqueue::store::MemoryStore;
//!
//! let config = ConfigLoader::new().load_config(None)?;
//! let store = Arc::new(MemoryStore::new());
//! let daemon = IngestionDaemon::new(&config, store, Arc::new(MemoryWriterFactory::new()))?;
//! daemon.run().await?;
//! ```

pub mod config;
pub mod daemon;
pub mod error;
pub mod lock;
pub mod payload;
pub mod queue;
pub mod routing;
pub mod shutdown;
pub mod store;
pub mod writer;

pub use config::{ConfigLoader, PublisherConfig, QueueConfig};
pub use daemon::{DaemonState, DaemonStats, IngestionDaemon, QueueOutcome};
pub use error::{DaemonError, QueueError, StoreError, ValidationError, WriteError};
pub use lock::DistributedLock;
pub use payload::{QueuePayload, SeriesFrame};
pub use queue::DurableQueue;
pub use routing::{QueueKind, RoutePlan};
pub use shutdown::ShutdownSignal;
pub use store::{KeyValueStore, MemoryStore};
pub use writer::{BatchWriteConfig, BatchedWriter};

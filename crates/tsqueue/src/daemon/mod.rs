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

//! The ingestion daemon.
//!
//! One cooperative loop drains every configured queue in declared order,
//! then sleeps the poll interval. Each item goes through
//! dequeue → fetch → validate → route → normalize → write → delete.
//! Item failures stay with the item; queue failures are logged and the loop
//! carries on; only startup errors are fatal.
//!
//! Shutdown is requested through the [`ShutdownSignal`] returned by
//! [`IngestionDaemon::shutdown_signal`]. It is checked after every item,
//! between queues and during the idle sleep.

mod factory;
mod state;

#[cfg(feature = "http")]
pub use factory::HttpWriterFactory;
pub use factory::{MemoryWriterFactory, WriterFactory};
pub use state::DaemonState;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, PublisherConfig, QueueConfig, Validate};
use crate::error::{DaemonError, QueueError};
use crate::payload::QueuePayload;
use crate::queue::DurableQueue;
use crate::routing::{normalize_tags, QueueRoute, RoutePlan};
use crate::shutdown::ShutdownSignal;
use crate::store::KeyValueStore;
use crate::writer::{BatchWriteConfig, BatchedWriter};

/// How often cumulative stats are logged while running.
pub const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Poll interval of the drain wait at shutdown.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of draining one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOutcome {
    pub processed: usize,
    pub failed: usize,
}

impl AddAssign for QueueOutcome {
    fn add_assign(&mut self, other: Self) {
        self.processed += other.processed;
        self.failed += other.failed;
    }
}

/// Cumulative counters since startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaemonStats {
    pub cycles: u64,
    pub processed: u64,
    pub failed: u64,
    pub cycle_errors: u64,
    pub override_writers: u64,
}

impl DaemonStats {
    fn record(&mut self, outcome: QueueOutcome) {
        self.processed += outcome.processed as u64;
        self.failed += outcome.failed as u64;
    }
}

struct ManagedQueue {
    config: QueueConfig,
    route: QueueRoute,
    queue: DurableQueue,
    writer: BatchedWriter,
}

/// Polls configured queues and republishes their payloads.
pub struct IngestionDaemon {
    queues: Vec<ManagedQueue>,
    factory: Arc<dyn WriterFactory>,
    ephemeral: Mutex<Vec<BatchedWriter>>,
    shutdown: ShutdownSignal,
    state: Mutex<DaemonState>,
    stats: Mutex<DaemonStats>,
    poll_interval: Duration,
    drain_timeout: Duration,
}

impl IngestionDaemon {
    /// Validates the configuration, resolves every queue against the routing
    /// table and builds one writer per queue.
    pub fn new(
        config: &PublisherConfig,
        store: Arc<dyn KeyValueStore>,
        factory: Arc<dyn WriterFactory>,
    ) -> Result<Self, DaemonError> {
        config.validate().map_err(ConfigError::from)?;

        let mut brokers: HashMap<String, DurableQueue> = HashMap::new();
        let mut queues = Vec::with_capacity(config.queues.len());
        for queue_config in &config.queues {
            let route = QueueRoute::resolve(queue_config)?;
            let write_config = BatchWriteConfig::from_queue_config(queue_config, route.batch_size)?;
            let writer = factory.create(route.database, write_config)?;
            info!(
                "Initialized writer for queue '{}' -> database '{}' (batch_size={})",
                queue_config.name,
                route.database,
                writer.config().batch_size()
            );

            let queue = brokers
                .entry(queue_config.namespace.clone())
                .or_insert_with(|| DurableQueue::new(store.clone(), queue_config.namespace.clone()))
                .clone();

            queues.push(ManagedQueue {
                config: queue_config.clone(),
                route,
                queue,
                writer,
            });
        }

        // Validation guarantees at least one queue.
        let poll_interval = config
            .queues
            .first()
            .map(QueueConfig::poll_interval)
            .unwrap_or(Duration::from_secs(2));

        Ok(Self {
            queues,
            factory,
            ephemeral: Mutex::new(Vec::new()),
            shutdown: ShutdownSignal::new(),
            state: Mutex::new(DaemonState::NotRunning),
            stats: Mutex::new(DaemonStats::default()),
            poll_interval,
            drain_timeout: config.drain_timeout(),
        })
    }

    /// Handle for requesting shutdown, e.g. from a signal task.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn state(&self) -> DaemonState {
        *self.state.lock()
    }

    pub fn stats(&self) -> DaemonStats {
        self.stats.lock().clone()
    }

    /// Configured queue names in processing order.
    pub fn queue_names(&self) -> Vec<&str> {
        self.queues.iter().map(|q| q.config.name.as_str()).collect()
    }

    /// Idle sleep between cycles, taken from the first queue.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn transition(&self, next: DaemonState) -> Result<(), DaemonError> {
        let mut state = self.state.lock();
        if !state.can_transition_to(next) {
            return Err(DaemonError::InvalidTransition {
                from: *state,
                to: next,
            });
        }
        debug!("Daemon state {} -> {}", *state, next);
        *state = next;
        Ok(())
    }

    /// Runs until shutdown is requested, then drains and closes every writer.
    ///
    /// Returns the cumulative stats. Fails only if the daemon has already
    /// run.
    pub async fn run(&self) -> Result<DaemonStats, DaemonError> {
        self.transition(DaemonState::Running)?;

        info!("Starting ingestion daemon...");
        info!("Monitoring {} queues", self.queues.len());
        for managed in &self.queues {
            info!(
                "  - {} -> table '{}' (database '{}')",
                managed.config.name, managed.config.table, managed.route.database
            );
            if !managed.writer.ping().await {
                warn!(
                    "Time-series database '{}' is unreachable; writes will be retried",
                    managed.route.database
                );
            }
        }

        let mut last_report = Instant::now();
        while self.shutdown.is_running() {
            match self.run_cycle().await {
                Ok(_) => {}
                Err(e) => {
                    self.stats.lock().cycle_errors += 1;
                    error!("Error in main loop: {}", e);
                }
            }
            self.stats.lock().cycles += 1;

            if last_report.elapsed() >= STATS_INTERVAL {
                self.log_stats();
                last_report = Instant::now();
            }

            if self.shutdown.is_running() {
                self.shutdown.sleep(self.poll_interval).await;
            }
        }

        self.transition(DaemonState::ShuttingDown)?;
        info!("Shutting down ingestion daemon...");
        self.cleanup().await;
        self.transition(DaemonState::Stopped)?;

        self.log_stats();
        info!("Shutdown complete");
        Ok(self.stats())
    }

    /// Drains every queue once, in declared order, then closes override
    /// writers with nothing left in flight.
    ///
    /// A queue-level failure aborts the rest of the cycle. Items handled
    /// before the failure are still counted in [`stats`](Self::stats).
    pub async fn run_cycle(&self) -> Result<QueueOutcome, DaemonError> {
        let mut total = QueueOutcome::default();
        let mut result = Ok(());
        for managed in &self.queues {
            if !self.shutdown.is_running() {
                break;
            }
            match self.drain_queue(managed).await {
                Ok(outcome) => total += outcome,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        self.reap_override_writers().await;
        result?;
        Ok(total)
    }

    /// Drains the current backlog of the configured queue `name`.
    pub async fn process_queue(&self, name: &str) -> Result<QueueOutcome, DaemonError> {
        let managed = self
            .queues
            .iter()
            .find(|q| q.config.name == name)
            .ok_or_else(|| DaemonError::UnknownQueue(name.to_string()))?;
        Ok(self.drain_queue(managed).await?)
    }

    async fn drain_queue(&self, managed: &ManagedQueue) -> Result<QueueOutcome, QueueError> {
        let name = managed.config.name.as_str();
        let queue_size = managed.queue.size(name).await?;
        if queue_size == 0 {
            return Ok(QueueOutcome::default());
        }

        info!("Processing queue '{}' ({} items pending)", name, queue_size);

        let mut outcome = QueueOutcome::default();
        let mut result = Ok(());
        while self.shutdown.is_running() {
            let item_id = match managed.queue.dequeue(name).await {
                Ok(Some(item_id)) => item_id,
                Ok(None) => break,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            };

            let item = if self.process_item(managed, &item_id).await {
                QueueOutcome {
                    processed: 1,
                    failed: 0,
                }
            } else {
                QueueOutcome {
                    processed: 0,
                    failed: 1,
                }
            };
            outcome += item;
            self.stats.lock().record(item);
        }

        info!(
            "Queue '{}' processing complete: {} successful, {} failed",
            name, outcome.processed, outcome.failed
        );
        result.map(|()| outcome)
    }

    /// Handles one dequeued item. Returns whether it was written.
    async fn process_item(&self, managed: &ManagedQueue, item_id: &str) -> bool {
        let name = managed.config.name.as_str();

        let raw = match managed.queue.get_data(name, item_id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                error!("No data found for {}, skipping", item_id);
                return false;
            }
            Err(QueueError::Decode { source, .. }) => {
                error!("Undecodable payload for {}: {}", item_id, source);
                self.delete_item(managed, item_id).await;
                return false;
            }
            Err(e) => {
                error!("Failed to fetch data for {}: {}", item_id, e);
                self.delete_item(managed, item_id).await;
                return false;
            }
        };

        let mut payload = match QueuePayload::from_value(raw) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Invalid data structure for {}: {}", item_id, e);
                self.delete_item(managed, item_id).await;
                return false;
            }
        };

        let plan = RoutePlan::resolve(managed.route.kind, &managed.config.table, &mut payload);
        let replaced = normalize_tags(&mut payload.frame, &plan.tag_columns);
        if replaced > 0 {
            warn!(
                "Replaced {} None/empty tag values for {} with placeholders",
                replaced, item_id
            );
        }
        debug!(
            "Routing {} for {} to table '{}' with tags {:?}",
            item_id, payload.ticker, plan.table, plan.tag_columns
        );

        let written = match payload.database.as_deref() {
            Some(database) if database != managed.writer.database() => {
                self.write_to_override(managed, database, &payload, &plan)
                    .await
            }
            _ => {
                managed
                    .writer
                    .write(&payload.ticker, &payload.frame, &plan)
                    .await
            }
        };

        if written {
            info!(
                "Successfully wrote {} records for {}",
                payload.row_count(),
                payload.ticker
            );
        } else {
            error!("Failed to write data for {}", payload.ticker);
        }

        self.delete_item(managed, item_id).await;
        written
    }

    /// Writes through a one-off writer for `database`, kept until cleanup.
    async fn write_to_override(
        &self,
        managed: &ManagedQueue,
        database: &str,
        payload: &QueuePayload,
        plan: &RoutePlan,
    ) -> bool {
        info!(
            "Creating writer for target database '{}' (default was '{}')",
            database,
            managed.writer.database()
        );
        let writer = match self
            .factory
            .create(database, BatchWriteConfig::override_fallback())
        {
            Ok(writer) => writer,
            Err(e) => {
                error!("Failed to create writer for '{}': {}", database, e);
                return false;
            }
        };
        self.stats.lock().override_writers += 1;

        let written = writer.write(&payload.ticker, &payload.frame, plan).await;
        self.ephemeral.lock().push(writer);
        written
    }

    /// Closes override writers whose batches have all been resolved.
    async fn reap_override_writers(&self) {
        let idle: Vec<BatchedWriter> = {
            let mut ephemeral = self.ephemeral.lock();
            let (idle, busy): (Vec<_>, Vec<_>) = std::mem::take(&mut *ephemeral)
                .into_iter()
                .partition(|w| w.pending().count() == 0);
            *ephemeral = busy;
            idle
        };
        for writer in &idle {
            writer.close(self.drain_timeout).await;
        }
        if !idle.is_empty() {
            debug!("Closed {} drained override writers", idle.len());
        }
    }

    async fn delete_item(&self, managed: &ManagedQueue, item_id: &str) {
        if let Err(e) = managed
            .queue
            .delete_data(&managed.config.name, item_id)
            .await
        {
            warn!("Failed to delete data for {}: {}", item_id, e);
        }
    }

    /// Waits for in-flight batches, then closes every writer.
    async fn cleanup(&self) {
        let ephemeral: Vec<BatchedWriter> = std::mem::take(&mut *self.ephemeral.lock());
        let writers: Vec<&BatchedWriter> = self
            .queues
            .iter()
            .map(|q| &q.writer)
            .chain(ephemeral.iter())
            .collect();

        let deadline = Instant::now() + self.drain_timeout;
        for writer in &writers {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !writer.wait_for_drain(remaining, DRAIN_POLL_INTERVAL).await {
                warn!(
                    "Writer for '{}' still has {} pending batches",
                    writer.database(),
                    writer.pending().count()
                );
            }
        }

        info!("Closing time-series writers...");
        for writer in &writers {
            writer
                .close(deadline.saturating_duration_since(Instant::now()))
                .await;
        }
    }

    fn log_stats(&self) {
        let stats = self.stats();
        info!(
            "Stats: {} cycles, {} processed, {} failed, {} cycle errors, {} override writers",
            stats.cycles, stats.processed, stats.failed, stats.cycle_errors, stats.override_writers
        );
    }
}

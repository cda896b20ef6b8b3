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

//! Implementation of the `run` command.
//!
//! Loads the publisher configuration, wires the daemon to Redis and the
//! time-series database (or to in-memory backends with `--dry-run`) and runs
//! it until SIGINT or SIGTERM.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tsqueue::config::ConfigLoader;
use tsqueue::daemon::{HttpWriterFactory, MemoryWriterFactory, WriterFactory};
use tsqueue::store::MemoryStore;
use tsqueue::{IngestionDaemon, KeyValueStore, ShutdownSignal};

use super::connect_store;

pub async fn run(config_path: Option<&Path>, dry_run: bool) -> Result<()> {
    let config = ConfigLoader::new()
        .load_config(config_path)
        .context("Failed to load publisher configuration")?;

    let (store, factory): (Arc<dyn KeyValueStore>, Arc<dyn WriterFactory>) = if dry_run {
        info!("[DRY RUN] Using in-memory store and writers");
        (
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryWriterFactory::new()),
        )
    } else {
        let store = connect_store(&config.redis).await?;
        info!(
            "Connected to Redis at {}:{} (db {})",
            config.redis.host, config.redis.port, config.redis.db
        );
        (store, Arc::new(HttpWriterFactory::new(config.influx.clone())))
    };

    let daemon =
        IngestionDaemon::new(&config, store, factory).context("Failed to start ingestion daemon")?;

    let listener = tokio::spawn(wait_for_shutdown_signal(daemon.shutdown_signal()));
    let result = daemon.run().await;
    listener.abort();

    let stats = result.context("Ingestion daemon failed")?;
    info!(
        "Processed {} items ({} failed) over {} cycles",
        stats.processed, stats.failed, stats.cycles
    );
    Ok(())
}

/// Triggers `shutdown` on SIGINT, or SIGTERM on Unix.
async fn wait_for_shutdown_signal(shutdown: ShutdownSignal) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, shutting down..."),
        () = terminate => info!("Received SIGTERM, shutting down..."),
    }
    shutdown.trigger();
}

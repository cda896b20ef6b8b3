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

//! tsqueue-publisher - ingestion daemon and queue diagnostics.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

/// Republishes queued time-series payloads into the time-series database
#[derive(Parser)]
#[command(name = "tsqueue-publisher")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingestion daemon until SIGINT or SIGTERM
    Run {
        /// Configuration file (defaults to PUBLISHER_CONFIG, then ./publisher_config.yaml)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Use an in-memory store and writers instead of Redis and InfluxDB
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the size and head of one or more queues
    Status {
        /// Queue to inspect (repeatable; defaults to every known queue)
        #[arg(long = "queue", short)]
        queues: Vec<String>,

        /// Key namespace of the broker
        #[arg(long, default_value = "queue")]
        namespace: String,

        /// Number of payloads whose ticker is shown
        #[arg(long, default_value_t = 3)]
        sample: usize,
    },

    /// Enqueue a JSON payload read from a file
    Enqueue {
        /// Target queue
        #[arg(long, short)]
        queue: String,

        /// Item id
        #[arg(long)]
        id: String,

        /// JSON payload file ("-" reads stdin)
        #[arg(long, short)]
        file: PathBuf,

        /// Payload time to live (e.g. "1h", "30m", "90s")
        #[arg(long, default_value = "1h")]
        ttl: String,

        /// Key namespace of the broker
        #[arg(long, default_value = "queue")]
        namespace: String,
    },

    /// Acquire a distributed lock, hold it, then release it
    Lock {
        /// Lock name
        #[arg(long)]
        name: String,

        /// Lock time to live
        #[arg(long, default_value = "10s")]
        ttl: String,

        /// How long to hold the lock before releasing it
        #[arg(long, default_value = "0s")]
        hold: String,

        /// Acquisition attempts
        #[arg(long, default_value_t = 1)]
        attempts: u32,

        /// Key namespace of the lock
        #[arg(long, default_value = "queue")]
        namespace: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Run { config, dry_run } => {
            commands::run::run(config.as_deref(), dry_run).await?;
        }
        Commands::Status {
            queues,
            namespace,
            sample,
        } => {
            commands::status::run(&queues, &namespace, sample).await?;
        }
        Commands::Enqueue {
            queue,
            id,
            file,
            ttl,
            namespace,
        } => {
            commands::enqueue::run(&queue, &id, &file, &ttl, &namespace).await?;
        }
        Commands::Lock {
            name,
            ttl,
            hold,
            attempts,
            namespace,
        } => {
            commands::lock::run(&name, &ttl, &hold, attempts, &namespace).await?;
        }
    }

    Ok(())
}

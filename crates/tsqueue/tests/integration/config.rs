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

//! Loading publisher configuration from disk and starting a daemon from it.

use serial_test::serial;
use std::env;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tsqueue::config::{ConfigError, ConfigLoader, CONFIG_ENV_VAR};
use tsqueue::daemon::MemoryWriterFactory;
use tsqueue::store::MemoryStore;
use tsqueue::{DaemonError, IngestionDaemon};

const CONFIG: &str = r#"
queues:
  - name: ohlcv_queue
    table: ohlcv
    poll_interval: 0.5
  - name: backtest_metrics_queue
    table: ${METRICS_TABLE:-metrics}
    namespace: backtests
    batch_size: 1000
drain_timeout_secs: 10
"#;

fn write_config(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
#[serial]
fn test_loaded_config_starts_daemon() {
    env::remove_var("METRICS_TABLE");
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "publisher_config.yaml", CONFIG);

    let config = ConfigLoader::new().load_config(Some(&path)).unwrap();
    assert_eq!(config.queues.len(), 2);
    assert_eq!(config.queues[1].table, "metrics");
    assert_eq!(config.queues[1].namespace, "backtests");
    assert_eq!(config.drain_timeout(), Duration::from_secs(10));

    let factory = Arc::new(MemoryWriterFactory::new());
    let daemon =
        IngestionDaemon::new(&config, Arc::new(MemoryStore::new()), factory.clone()).unwrap();
    assert_eq!(daemon.poll_interval(), Duration::from_millis(500));
    assert_eq!(
        daemon.queue_names(),
        vec!["ohlcv_queue", "backtest_metrics_queue"]
    );

    let created = factory.created();
    assert_eq!(created[0].1.batch_size(), 300_000);
    assert_eq!(created[1].1.batch_size(), 1000);
}

#[test]
#[serial]
fn test_env_var_points_at_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "custom.yml", CONFIG);
    env::set_var(CONFIG_ENV_VAR, &path);
    env::set_var("METRICS_TABLE", "summaries");

    let loader = ConfigLoader::with_search_paths(vec![dir.path().join("missing.yaml")]);
    let result = loader.load_config(None);

    env::remove_var(CONFIG_ENV_VAR);
    env::remove_var("METRICS_TABLE");

    let config = result.unwrap();
    assert_eq!(config.queues[1].table, "summaries");
}

#[test]
#[serial]
fn test_missing_config_lists_search_paths() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = TempDir::new().unwrap();
    let expected = dir.path().join("publisher_config.yaml");
    let loader = ConfigLoader::with_search_paths(vec![expected.clone()]);

    match loader.load_config(None) {
        Err(ConfigError::ConfigNotFound { searched }) => assert_eq!(searched, vec![expected]),
        other => panic!("expected ConfigNotFound, got {:?}", other),
    }
}

#[test]
#[serial]
fn test_protected_batch_size_in_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "publisher_config.yaml",
        "queues:\n  - name: ohlcv_queue\n    table: ohlcv\n    batch_size: 500\n",
    );

    let config = ConfigLoader::new().load_config(Some(&path)).unwrap();
    let result = IngestionDaemon::new(
        &config,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryWriterFactory::new()),
    );
    assert!(matches!(
        result,
        Err(DaemonError::Config(ConfigError::ProtectedBatchSize {
            required: 300_000,
            attempted: 500,
            ..
        }))
    ));
}

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

//! End-to-end processing of queued payloads through the ingestion daemon.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tsqueue::config::QueueConfig;
use tsqueue::daemon::{DaemonState, MemoryWriterFactory};
use tsqueue::writer::MemoryMode;
use tsqueue::{DurableQueue, IngestionDaemon, KeyValueStore};

use crate::fixtures::{publisher_config, FlakyStore, TestFixture, TTL};

#[tokio::test]
async fn test_ohlcv_item_is_written_and_removed() {
    let fixture = TestFixture::new(&[("ohlcv_queue", "ohlcv")]);
    fixture
        .enqueue(
            "ohlcv_queue",
            "AAPL_1",
            json!({"ticker": "AAPL", "candles": {"datetime": [1700000000000i64], "close": [100.0]}}),
        )
        .await;

    let outcome = fixture.daemon.process_queue("ohlcv_queue").await.unwrap();
    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.failed, 0);

    let requests = fixture.requests("ohlcv");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].table, "ohlcv");
    assert_eq!(requests[0].tag_columns, vec!["ticker"]);
    assert_eq!(
        requests[0].lines,
        vec!["ohlcv,ticker=AAPL close=100 1700000000000000000"]
    );

    assert!(fixture
        .queue
        .get_data("ohlcv_queue", "AAPL_1")
        .await
        .unwrap()
        .is_none());
    assert_eq!(fixture.queue.size("ohlcv_queue").await.unwrap(), 0);
}

#[tokio::test]
async fn test_empty_datetime_fails_and_removes_item() {
    let fixture = TestFixture::new(&[("ohlcv_queue", "ohlcv")]);
    fixture
        .enqueue(
            "ohlcv_queue",
            "AAPL_1",
            json!({"ticker": "AAPL", "candles": {"datetime": []}}),
        )
        .await;

    let outcome = fixture.daemon.process_queue("ohlcv_queue").await.unwrap();
    assert_eq!(outcome.processed, 0);
    assert_eq!(outcome.failed, 1);
    assert!(fixture.requests("ohlcv").is_empty());
    assert!(!fixture
        .store
        .contains_key(&fixture.queue.data_key("ohlcv_queue", "AAPL_1")));
}

#[tokio::test]
async fn test_invalid_payloads_are_never_processed() {
    let fixture = TestFixture::new(&[("fundamentals_queue", "fundamentals")]);
    let invalid = [
        json!({"data": {"datetime": [1], "pe": [30.0]}}),
        json!({"ticker": "", "data": {"datetime": [1], "pe": [30.0]}}),
        json!({"ticker": "AAPL"}),
        json!({"ticker": "AAPL", "data": {}}),
        json!({"ticker": "AAPL", "data": []}),
        json!({"ticker": "AAPL", "data": {"datetime": [1, 2], "pe": [30.0]}}),
    ];
    for (i, payload) in invalid.iter().enumerate() {
        fixture
            .enqueue("fundamentals_queue", &format!("bad_{}", i), payload.clone())
            .await;
    }

    let outcome = fixture
        .daemon
        .process_queue("fundamentals_queue")
        .await
        .unwrap();
    assert_eq!(outcome.processed, 0);
    assert_eq!(outcome.failed, invalid.len());
    assert!(fixture.requests("algo-trader-fundamentals").is_empty());
    assert_eq!(fixture.store.key_count(), 0);
}

#[tokio::test]
async fn test_undecodable_payload_is_deleted() {
    let fixture = TestFixture::new(&[("ohlcv_queue", "ohlcv")]);
    let data_key = fixture.queue.data_key("ohlcv_queue", "raw_1");
    fixture
        .store
        .set_with_ttl(&data_key, "{not json", TTL)
        .await
        .unwrap();
    fixture
        .store
        .push_tail(&fixture.queue.pending_key("ohlcv_queue"), "raw_1")
        .await
        .unwrap();

    let outcome = fixture.daemon.process_queue("ohlcv_queue").await.unwrap();
    assert_eq!(outcome.failed, 1);
    assert!(!fixture.store.contains_key(&data_key));
}

#[tokio::test]
async fn test_duplicate_enqueue_leaves_a_ghost_id() {
    let fixture = TestFixture::new(&[("ohlcv_queue", "ohlcv")]);
    let payload = json!({"ticker": "AAPL", "candles": {"datetime": [1], "close": [1.0]}});
    fixture
        .enqueue("ohlcv_queue", "AAPL_1", payload.clone())
        .await;
    fixture.enqueue("ohlcv_queue", "AAPL_1", payload).await;
    assert_eq!(fixture.queue.size("ohlcv_queue").await.unwrap(), 2);

    let outcome = fixture.daemon.process_queue("ohlcv_queue").await.unwrap();
    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.failed, 1);
    assert_eq!(fixture.requests("ohlcv").len(), 1);
}

#[tokio::test]
async fn test_studies_params_become_tag_columns() {
    let fixture = TestFixture::new(&[("backtest_studies_queue", "studies")]);
    fixture
        .enqueue(
            "backtest_studies_queue",
            "sma_1",
            json!({
                "ticker": "AAPL",
                "strategy_name": "sma",
                "strategy_params": {"short": 10, "long": 20, "side": "LONG"},
                "data": {"datetime": [1], "pnl": [1.5]}
            }),
        )
        .await;

    let outcome = fixture
        .daemon
        .process_queue("backtest_studies_queue")
        .await
        .unwrap();
    assert_eq!(outcome.processed, 1);

    let requests = fixture.requests("algo-trader-trading-journal");
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.table, "sma");
    for tag in ["ticker", "strategy", "short_window", "long_window"] {
        assert!(request.tag_columns.iter().any(|t| t == tag), "missing {}", tag);
    }
    for absent in ["side", "short", "long"] {
        assert!(!request.tag_columns.iter().any(|t| t == absent));
    }
    assert_eq!(
        request.lines,
        vec!["sma,ticker=AAPL,strategy=sma,short_window=10,long_window=20 pnl=1.5 1000000"]
    );
}

#[tokio::test]
async fn test_raw_trades_keep_params_out_of_tags() {
    let fixture = TestFixture::new(&[("backtest_trades_queue", "trades")]);
    fixture
        .enqueue(
            "backtest_trades_queue",
            "trade_1",
            json!({
                "ticker": "AAPL",
                "strategy_name": "sma",
                "hash_id": "abc123",
                "strategy_params": {"short": 10, "long": 20, "side": "LONG"},
                "data": [{"datetime": 1, "price": 101.25, "qty": 10}]
            }),
        )
        .await;
    fixture
        .enqueue(
            "backtest_trades_queue",
            "trade_2",
            json!({
                "ticker": "AAPL",
                "strategy_name": "sma",
                "portfolio_stage": "phase1",
                "data": [{"datetime": 2, "price": 99.0, "qty": 5}]
            }),
        )
        .await;

    let outcome = fixture
        .daemon
        .process_queue("backtest_trades_queue")
        .await
        .unwrap();
    assert_eq!(outcome.processed, 2);

    let requests = fixture.requests("algo-trader-trading-journal");
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].table, "trades");
    assert_eq!(requests[0].tag_columns, vec!["ticker", "hash", "strategy"]);
    assert_eq!(requests[1].table, "local_trades");
    assert_eq!(requests[1].tag_columns, vec!["ticker", "strategy"]);
}

#[tokio::test]
async fn test_metrics_tags_are_normalized_to_placeholder() {
    let fixture = TestFixture::new(&[("backtest_metrics_queue", "metrics")]);
    fixture
        .enqueue(
            "backtest_metrics_queue",
            "metrics_1",
            json!({
                "ticker": "AAPL",
                "strategy_name": "sma",
                "backtest_id": "bt-7",
                "data": {
                    "datetime": [1, 2, 3],
                    "strategy": ["sma", null, ""],
                    "sharpe": [1.0, 2.0, 3.0]
                }
            }),
        )
        .await;

    let outcome = fixture
        .daemon
        .process_queue("backtest_metrics_queue")
        .await
        .unwrap();
    assert_eq!(outcome.processed, 1);

    let requests = fixture.requests("algo-trader-trading-journal");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].table, "sma_summary");
    assert_eq!(
        requests[0].lines,
        vec![
            "sma_summary,ticker=AAPL,strategy=sma,backtest_id=bt-7 sharpe=1 1000000",
            "sma_summary,ticker=AAPL,strategy=unknown,backtest_id=bt-7 sharpe=2 2000000",
            "sma_summary,ticker=AAPL,strategy=unknown,backtest_id=bt-7 sharpe=3 3000000",
        ]
    );
}

#[tokio::test]
async fn test_rejected_write_counts_as_failed_and_deletes() {
    let fixture = TestFixture::with_mode(&[("ohlcv_queue", "ohlcv")], MemoryMode::Reject);
    fixture
        .enqueue(
            "ohlcv_queue",
            "AAPL_1",
            json!({"ticker": "AAPL", "candles": {"datetime": [1], "close": [1.0]}}),
        )
        .await;

    let outcome = fixture.daemon.process_queue("ohlcv_queue").await.unwrap();
    assert_eq!(outcome.processed, 0);
    assert_eq!(outcome.failed, 1);
    assert!(fixture
        .queue
        .get_data("ohlcv_queue", "AAPL_1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_run_cycle_drains_queues_in_order() {
    let fixture = TestFixture::new(&[("ohlcv_queue", "ohlcv"), ("fundamentals_queue", "fundamentals")]);
    fixture
        .enqueue(
            "ohlcv_queue",
            "AAPL_1",
            json!({"ticker": "AAPL", "candles": {"datetime": [1], "close": [1.0]}}),
        )
        .await;
    fixture
        .enqueue(
            "fundamentals_queue",
            "AAPL_F",
            json!({"ticker": "AAPL", "data": {"datetime": [1], "pe": [30.5]}}),
        )
        .await;
    fixture
        .enqueue("fundamentals_queue", "BAD", json!({"ticker": "AAPL"}))
        .await;

    let outcome = fixture.daemon.run_cycle().await.unwrap();
    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(
        fixture.requests("algo-trader-fundamentals")[0].lines,
        vec!["fundamentals,ticker=AAPL pe=30.5 1000000"]
    );

    let stats = fixture.daemon.stats();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn test_shutdown_before_cycle_leaves_backlog() {
    let fixture = TestFixture::new(&[("ohlcv_queue", "ohlcv")]);
    fixture
        .enqueue(
            "ohlcv_queue",
            "AAPL_1",
            json!({"ticker": "AAPL", "candles": {"datetime": [1], "close": [1.0]}}),
        )
        .await;

    fixture.daemon.shutdown_signal().trigger();
    let outcome = fixture.daemon.run_cycle().await.unwrap();
    assert_eq!(outcome.processed, 0);
    assert_eq!(fixture.queue.size("ohlcv_queue").await.unwrap(), 1);
}

#[tokio::test]
async fn test_run_processes_backlog_then_stops() {
    let fixture = Arc::new(TestFixture::new(&[("ohlcv_queue", "ohlcv")]));
    for i in 0..3 {
        fixture
            .enqueue(
                "ohlcv_queue",
                &format!("AAPL_{}", i),
                json!({"ticker": "AAPL", "candles": {"datetime": [i + 1], "close": [1.0]}}),
            )
            .await;
    }

    let runner = fixture.clone();
    let handle = tokio::spawn(async move { runner.daemon.run().await });

    let mut waited = Duration::ZERO;
    while fixture.queue.size("ohlcv_queue").await.unwrap() > 0 && waited < Duration::from_secs(2) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }

    fixture.daemon.shutdown_signal().trigger();
    let stats = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("daemon should stop promptly")
        .unwrap()
        .unwrap();

    assert_eq!(stats.processed, 3);
    assert_eq!(fixture.daemon.state(), DaemonState::Stopped);
    assert!(fixture.factory.transport("ohlcv").unwrap().is_closed());
    assert_eq!(fixture.requests("ohlcv").len(), 3);
}

fn candle(ticker: &str) -> serde_json::Value {
    json!({"ticker": ticker, "candles": {"datetime": [1700000000000i64], "close": [100.0]}})
}

#[tokio::test]
async fn test_store_failure_mid_drain_keeps_partial_counts() {
    let store = Arc::new(FlakyStore::new());
    let factory = Arc::new(MemoryWriterFactory::new());
    let daemon = IngestionDaemon::new(
        &publisher_config(vec![QueueConfig::new("ohlcv_queue", "ohlcv")]),
        store.clone(),
        factory.clone(),
    )
    .unwrap();
    let queue = DurableQueue::new(store.clone(), "queue");
    for id in ["AAPL_1", "MSFT_1"] {
        queue
            .enqueue("ohlcv_queue", id, &candle(&id[..4]), TTL)
            .await
            .unwrap();
    }

    store.fail_pops(1, 1);
    assert!(daemon.run_cycle().await.is_err());
    assert_eq!(factory.transport("ohlcv").unwrap().requests().len(), 1);
    assert_eq!(daemon.stats().processed, 1);
    assert_eq!(queue.size("ohlcv_queue").await.unwrap(), 1);

    let outcome = daemon.run_cycle().await.unwrap();
    assert_eq!(outcome.processed, 1);
    assert_eq!(daemon.stats().processed, 2);
    assert_eq!(daemon.stats().failed, 0);
}

#[tokio::test]
async fn test_queue_failures_do_not_stop_the_main_loop() {
    let store = Arc::new(FlakyStore::new());
    let factory = Arc::new(MemoryWriterFactory::new());
    let mut queue_config = QueueConfig::new("ohlcv_queue", "ohlcv");
    queue_config.poll_interval = 0.05;
    let daemon = Arc::new(
        IngestionDaemon::new(
            &publisher_config(vec![queue_config]),
            store.clone(),
            factory.clone(),
        )
        .unwrap(),
    );
    let queue = DurableQueue::new(store.clone(), "queue");
    queue
        .enqueue("ohlcv_queue", "AAPL_1", &candle("AAPL"), TTL)
        .await
        .unwrap();
    store.fail_pops(0, 3);

    let runner = daemon.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    let wait_for = |processed: u64| {
        let daemon = daemon.clone();
        async move {
            tokio::time::timeout(Duration::from_secs(5), async {
                while daemon.stats().processed < processed {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            })
            .await
            .expect("daemon should keep processing")
        }
    };

    wait_for(1).await;
    assert_eq!(daemon.stats().cycle_errors, 3);
    assert_eq!(daemon.state(), DaemonState::Running);

    queue
        .enqueue("ohlcv_queue", "MSFT_1", &candle("MSFT"), TTL)
        .await
        .unwrap();
    wait_for(2).await;

    daemon.shutdown_signal().trigger();
    let stats = handle.await.unwrap().unwrap();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.cycle_errors, 3);
    assert!(stats.cycles >= 5);
    assert_eq!(factory.transport("ohlcv").unwrap().requests().len(), 2);
    assert_eq!(daemon.state(), DaemonState::Stopped);
}

#[tokio::test]
async fn test_drained_override_writers_are_closed_each_cycle() {
    let fixture = TestFixture::new(&[("fundamentals_queue", "fundamentals")]);
    let payload = json!({
        "ticker": "AAPL",
        "data": {"datetime": [1], "pe": [30.5]},
        "database": "scratch"
    });
    fixture
        .enqueue("fundamentals_queue", "AAPL_1", payload.clone())
        .await;

    fixture.daemon.run_cycle().await.unwrap();
    let scratch = fixture.factory.transport("scratch").unwrap();
    assert!(scratch.is_closed());

    fixture.enqueue("fundamentals_queue", "AAPL_2", payload).await;
    let outcome = fixture.daemon.run_cycle().await.unwrap();
    assert_eq!(outcome.processed, 1);
    assert_eq!(fixture.requests("scratch").len(), 2);
    assert_eq!(fixture.daemon.stats().override_writers, 2);
}

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

//! Producer/consumer behaviour of the durable queue.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tsqueue::store::MemoryStore;
use tsqueue::DurableQueue;

use crate::fixtures::TTL;

fn queue() -> DurableQueue {
    DurableQueue::new(Arc::new(MemoryStore::new()), "queue")
}

#[tokio::test]
async fn test_payloads_survive_round_trip_unchanged() {
    let queue = queue();
    let payloads = vec![
        json!({"ticker": "AAPL", "candles": {"datetime": [1700000000000i64], "close": [100.0]}}),
        json!({"ticker": "MSFT", "data": [{"datetime": 1, "pe": 31.2, "sector": "tech"}]}),
        json!({
            "ticker": "SPY",
            "strategy_name": "sma",
            "strategy_params": {"short": 10, "long": 20, "side": "LONG"},
            "data": {"datetime": [1, 2], "pnl": [null, -3.5]}
        }),
        json!({"nested": {"deep": [1, [2, [3]]]}, "unicode": "résumé ✓"}),
    ];

    for (i, payload) in payloads.iter().enumerate() {
        assert!(queue
            .enqueue("ohlcv_queue", &format!("item_{}", i), payload, TTL)
            .await
            .unwrap());
    }

    for (i, payload) in payloads.iter().enumerate() {
        let item_id = queue.dequeue("ohlcv_queue").await.unwrap().unwrap();
        assert_eq!(item_id, format!("item_{}", i));
        let stored = queue.get_data("ohlcv_queue", &item_id).await.unwrap();
        assert_eq!(stored.as_ref(), Some(payload));
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Fill {
    ticker: String,
    qty: i64,
}

#[tokio::test]
async fn test_typed_payloads() {
    let queue = queue();
    let fill = Fill {
        ticker: "AAPL".to_string(),
        qty: 5,
    };
    queue
        .enqueue("trading_journal_queue", "fill_1", &fill, TTL)
        .await
        .unwrap();
    let read: Option<Fill> = queue
        .get_data_as("trading_journal_queue", "fill_1")
        .await
        .unwrap();
    assert_eq!(read, Some(fill));
}

#[tokio::test]
async fn test_empty_dequeue_is_repeatable() {
    let queue = queue();
    for _ in 0..5 {
        assert_eq!(queue.dequeue("ohlcv_queue").await.unwrap(), None);
    }
    assert_eq!(queue.size("ohlcv_queue").await.unwrap(), 0);
}

#[tokio::test]
async fn test_queues_are_isolated_by_name_and_namespace() {
    let store = Arc::new(MemoryStore::new());
    let default = DurableQueue::new(store.clone(), "queue");
    let other = DurableQueue::new(store, "staging");

    default
        .enqueue("ohlcv_queue", "a", &json!({"n": 1}), TTL)
        .await
        .unwrap();
    default
        .enqueue("fundamentals_queue", "b", &json!({"n": 2}), TTL)
        .await
        .unwrap();

    assert_eq!(other.dequeue("ohlcv_queue").await.unwrap(), None);
    assert_eq!(
        default.dequeue("ohlcv_queue").await.unwrap().as_deref(),
        Some("a")
    );
    assert_eq!(default.size("fundamentals_queue").await.unwrap(), 1);
}

#[tokio::test]
async fn test_status_samples_head_of_queue() {
    let queue = queue();
    for i in 0..12 {
        queue
            .enqueue(
                "ohlcv_queue",
                &format!("T{}", i),
                &json!({"ticker": format!("T{}", i)}),
                TTL,
            )
            .await
            .unwrap();
    }

    let status = queue.status("ohlcv_queue", 3).await.unwrap();
    assert_eq!(status.size, 12);
    assert_eq!(status.sample_items.len(), 10);
    assert_eq!(status.sample_items[0], "T0");
    assert_eq!(
        status.sample_tickers,
        vec![
            ("T0".to_string(), Some("T0".to_string())),
            ("T1".to_string(), Some("T1".to_string())),
            ("T2".to_string(), Some("T2".to_string())),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_expired_payload_reads_as_missing() {
    let queue = queue();
    queue
        .enqueue("ohlcv_queue", "a", &json!({"n": 1}), Duration::from_secs(1))
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;

    let item_id = queue.dequeue("ohlcv_queue").await.unwrap().unwrap();
    assert_eq!(queue.get_data("ohlcv_queue", &item_id).await.unwrap(), None);
    assert!(!queue.delete_data("ohlcv_queue", &item_id).await.unwrap());
}

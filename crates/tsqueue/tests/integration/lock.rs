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

//! Mutual exclusion between independent lock clients sharing one store.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tsqueue::store::MemoryStore;
use tsqueue::{DistributedLock, ShutdownSignal};

fn clients(n: usize) -> Vec<DistributedLock> {
    let store = Arc::new(MemoryStore::new());
    (0..n)
        .map(|_| DistributedLock::new(store.clone(), "schwab"))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_has_one_winner() {
    let mut attempts = JoinSet::new();
    for lock in clients(8) {
        attempts.spawn(async move {
            lock.acquire(
                "token_refresh",
                Duration::from_secs(10),
                Duration::from_millis(5),
                3,
            )
            .await
        });
    }

    let mut winners = 0;
    while let Some(won) = attempts.join_next().await {
        if won.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_release_hands_lock_to_waiter() {
    let clients = clients(2);
    let ttl = Duration::from_secs(10);
    assert!(clients[0].try_acquire("x", ttl).await);
    assert!(!clients[1].try_acquire("x", ttl).await);

    let waiter = {
        let lock = clients[1].clone();
        tokio::spawn(async move {
            lock.acquire("x", ttl, Duration::from_millis(20), 50).await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(clients[0].release("x").await);

    assert!(waiter.await.unwrap());
    assert!(!clients[0].try_acquire("x", ttl).await);
}

#[tokio::test]
async fn test_locks_are_independent_by_name() {
    let clients = clients(2);
    let ttl = Duration::from_secs(10);
    assert!(clients[0].try_acquire("a", ttl).await);
    assert!(clients[1].try_acquire("b", ttl).await);
}

#[tokio::test]
async fn test_cancellable_acquire_stops_on_shutdown() {
    let clients = clients(2);
    let ttl = Duration::from_secs(30);
    assert!(clients[0].try_acquire("x", ttl).await);

    let signal = ShutdownSignal::new();
    let waiter = {
        let lock = clients[1].clone();
        let signal = signal.clone();
        tokio::spawn(async move {
            lock.acquire_cancellable("x", ttl, Duration::from_secs(5), 100, &signal)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    signal.trigger();

    let acquired = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("acquire should give up promptly")
        .unwrap();
    assert!(!acquired);
}

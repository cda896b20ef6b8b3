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

//! Batched time-series writes.
//!
//! A [`BatchedWriter`] owns one [`WriteTransport`] for one target database
//! and a [`PendingBatches`] counter fed by the transport's callbacks.
//! [`write`](BatchedWriter::write) only reports whether the submission was
//! accepted; durability is observed through the counter and
//! [`wait_for_drain`](BatchedWriter::wait_for_drain).

mod config;
#[cfg(feature = "http")]
mod http;
mod line_protocol;
mod pending;
mod transport;

pub use config::{BatchWriteConfig, BatchWriteConfigBuilder, RetryPolicy};
#[cfg(feature = "http")]
pub use http::LineProtocolTransport;
pub use line_protocol::encode_frame;
pub use pending::PendingBatches;
pub use transport::{
    BatchCallbacks, BatchDescriptor, MemoryMode, MemoryTransport, WriteRequest, WriteTransport,
};

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::payload::SeriesFrame;
use crate::routing::RoutePlan;

/// Writer for one target database.
pub struct BatchedWriter {
    database: String,
    config: BatchWriteConfig,
    transport: Arc<dyn WriteTransport>,
    pending: Arc<PendingBatches>,
}

impl BatchedWriter {
    pub fn new(
        database: impl Into<String>,
        config: BatchWriteConfig,
        transport: Arc<dyn WriteTransport>,
    ) -> Self {
        Self {
            database: database.into(),
            config,
            transport,
            pending: Arc::new(PendingBatches::new()),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn config(&self) -> &BatchWriteConfig {
        &self.config
    }

    pub fn pending(&self) -> &PendingBatches {
        &self.pending
    }

    /// Submits `frame` for `ticker` to the table and tags in `plan`.
    ///
    /// Returns whether the submission was accepted, not whether it was
    /// flushed. Encoding and submission failures are logged and reported as
    /// `false`.
    pub async fn write(&self, ticker: &str, frame: &SeriesFrame, plan: &RoutePlan) -> bool {
        let lines = match encode_frame(&plan.table, ticker, &plan.tag_columns, frame) {
            Ok(lines) => lines,
            Err(e) => {
                error!("Failed to encode {} rows for {}: {}", frame.len(), ticker, e);
                return false;
            }
        };
        if lines.is_empty() {
            warn!(
                "No writable fields in {} rows for {} (table '{}')",
                frame.len(),
                ticker,
                plan.table
            );
            return false;
        }

        let request = WriteRequest {
            database: self.database.clone(),
            table: plan.table.clone(),
            ticker: ticker.to_string(),
            tag_columns: plan.tag_columns.clone(),
            rows: lines.len(),
            lines,
        };

        self.pending.submit();
        match self.transport.submit(request, self.pending.clone()).await {
            Ok(()) => {
                debug!(
                    "Submitted {} rows for {} to {}.{}",
                    frame.len(),
                    ticker,
                    self.database,
                    plan.table
                );
                true
            }
            Err(e) => {
                self.pending.release();
                error!(
                    "Failed to submit rows for {} to '{}': {}",
                    ticker, self.database, e
                );
                false
            }
        }
    }

    /// Waits until every submission has been resolved or `timeout` elapses.
    pub async fn wait_for_drain(&self, timeout: Duration, poll_interval: Duration) -> bool {
        self.pending.drain(timeout, poll_interval).await
    }

    /// Whether the backend is reachable.
    pub async fn ping(&self) -> bool {
        self.transport.ping().await
    }

    /// Flushes and releases the transport within `timeout`. Batches still
    /// unresolved by then are counted as failed. Failures are logged, never
    /// raised.
    pub async fn close(&self, timeout: Duration) {
        match self.transport.close(timeout).await {
            Ok(()) => info!("Closed writer for database '{}'", self.database),
            Err(e) => warn!("Error closing writer for '{}': {}", self.database, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::ColumnValues;

    fn frame() -> SeriesFrame {
        SeriesFrame::new(
            vec![1_700_000_000_000],
            vec![("close".to_string(), ColumnValues::Float(vec![Some(100.0)]))],
        )
        .unwrap()
    }

    fn plan() -> RoutePlan {
        RoutePlan {
            table: "ohlcv".to_string(),
            tag_columns: vec!["ticker".to_string()],
        }
    }

    fn writer(mode: MemoryMode) -> (Arc<MemoryTransport>, BatchedWriter) {
        let transport = Arc::new(MemoryTransport::with_mode(mode));
        let writer = BatchedWriter::new("ohlcv", BatchWriteConfig::default(), transport.clone());
        (transport, writer)
    }

    #[tokio::test]
    async fn test_successful_write_is_recorded_and_drained() {
        let (transport, writer) = writer(MemoryMode::Succeed);
        assert!(writer.write("AAPL", &frame(), &plan()).await);
        assert_eq!(writer.pending().count(), 0);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].database, "ohlcv");
        assert_eq!(
            requests[0].lines,
            vec!["ohlcv,ticker=AAPL close=100 1700000000000000000"]
        );
    }

    #[tokio::test]
    async fn test_terminal_error_still_counts_as_accepted() {
        let (_, writer) = writer(MemoryMode::Fail);
        assert!(writer.write("AAPL", &frame(), &plan()).await);
        assert_eq!(writer.pending().count(), 0);
    }

    #[tokio::test]
    async fn test_retries_do_not_release_early() {
        let (_, writer) = writer(MemoryMode::RetryThenSucceed { retries: 3 });
        assert!(writer.write("AAPL", &frame(), &plan()).await);
        assert_eq!(writer.pending().count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_submission_returns_false_and_releases() {
        let (transport, writer) = writer(MemoryMode::Reject);
        assert!(!writer.write("AAPL", &frame(), &plan()).await);
        assert_eq!(writer.pending().count(), 0);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let (transport, writer) = writer(MemoryMode::Succeed);
        writer.close(Duration::from_secs(1)).await;
        assert!(transport.is_closed());
        assert!(!writer.write("AAPL", &frame(), &plan()).await);
        assert!(!writer.ping().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_drain_tracks_held_batches() {
        let (transport, writer) = writer(MemoryMode::Hold);
        assert!(writer.write("AAPL", &frame(), &plan()).await);
        assert!(writer.write("MSFT", &frame(), &plan()).await);
        assert_eq!(writer.pending().count(), 2);

        assert!(
            !writer
                .wait_for_drain(Duration::from_secs(1), Duration::from_millis(100))
                .await
        );

        assert_eq!(transport.release_held(), 2);
        assert!(
            writer
                .wait_for_drain(Duration::from_secs(1), Duration::from_millis(100))
                .await
        );
    }

    #[tokio::test]
    async fn test_close_resolves_held_batches() {
        let (transport, writer) = writer(MemoryMode::Hold);
        assert!(writer.write("AAPL", &frame(), &plan()).await);
        assert_eq!(writer.pending().count(), 1);

        writer.close(Duration::ZERO).await;
        assert_eq!(writer.pending().count(), 0);
        assert_eq!(transport.release_held(), 0);
    }

    #[tokio::test]
    async fn test_frame_without_fields_is_not_submitted() {
        let (transport, writer) = writer(MemoryMode::Succeed);
        let empty = SeriesFrame::new(vec![1], vec![]).unwrap();
        assert!(!writer.write("AAPL", &empty, &plan()).await);
        assert!(transport.requests().is_empty());
        assert_eq!(writer.pending().count(), 0);
    }
}

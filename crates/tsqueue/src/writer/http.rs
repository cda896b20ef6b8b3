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

//! HTTP line protocol transport.
//!
//! Requests are handed to a background task which buffers them and flushes
//! when `batch_size` lines are waiting or `flush_interval` (plus jitter) has
//! passed since the first buffered line. A flush is a single
//! `POST /api/v3/write_lp` carrying every buffered request; requests are
//! never split across flushes, so each one is resolved by exactly one
//! callback.
//!
//! Accepted requests are tracked until resolved. If [`close`] runs out of
//! time, the flush task is aborted and whatever it still owed is resolved
//! through `error`.
//!
//! [`close`]: WriteTransport::close

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{header, Client, StatusCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use super::config::{BatchWriteConfig, RetryPolicy};
use super::transport::{BatchCallbacks, WriteRequest, WriteTransport};
use crate::config::InfluxSettings;
use crate::error::WriteError;

type Submission = (u64, Arc<WriteRequest>);

/// Accepted requests whose callbacks have not fired yet.
///
/// Whoever removes an entry fires its terminal callback, so each request is
/// resolved exactly once even when close races the flush task.
#[derive(Default)]
struct Outstanding {
    entries: Mutex<HashMap<u64, (Arc<WriteRequest>, Arc<dyn BatchCallbacks>)>>,
}

impl Outstanding {
    fn insert(&self, id: u64, request: Arc<WriteRequest>, callbacks: Arc<dyn BatchCallbacks>) {
        self.entries.lock().insert(id, (request, callbacks));
    }

    fn callbacks(&self, id: u64) -> Option<Arc<dyn BatchCallbacks>> {
        self.entries.lock().get(&id).map(|(_, cb)| cb.clone())
    }

    fn take(&self, id: u64) -> Option<Arc<dyn BatchCallbacks>> {
        self.entries.lock().remove(&id).map(|(_, cb)| cb)
    }

    fn take_all(&self) -> Vec<(Arc<WriteRequest>, Arc<dyn BatchCallbacks>)> {
        self.entries.lock().drain().map(|(_, entry)| entry).collect()
    }
}

/// Shared by the transport handle and its flush task.
struct Endpoint {
    client: Client,
    write_url: Url,
    health_url: Url,
    token: Option<String>,
}

impl Endpoint {
    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header(header::AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn post(&self, body: String) -> Result<(), WriteError> {
        let response = self
            .authorized(self.client.post(self.write_url.clone()))
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| WriteError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(WriteError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

/// [`WriteTransport`] speaking InfluxDB 3 line protocol over HTTP.
pub struct LineProtocolTransport {
    database: String,
    endpoint: Arc<Endpoint>,
    outstanding: Arc<Outstanding>,
    next_id: AtomicU64,
    sender: Mutex<Option<mpsc::UnboundedSender<Submission>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LineProtocolTransport {
    /// Creates the transport and starts its flush task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        settings: &InfluxSettings,
        database: &str,
        config: &BatchWriteConfig,
    ) -> Result<Self, WriteError> {
        let base = Url::parse(&settings.url)
            .map_err(|e| WriteError::InvalidConfig {
                message: format!("invalid time-series URL '{}': {}", settings.url, e),
            })?;
        let mut write_url = join(&base, "api/v3/write_lp")?;
        write_url
            .query_pairs_mut()
            .append_pair("db", database)
            .append_pair("precision", "nanosecond");
        let health_url = join(&base, "health")?;

        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| WriteError::InvalidConfig {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        let endpoint = Arc::new(Endpoint {
            client,
            write_url,
            health_url,
            token: settings.token.clone(),
        });

        let outstanding = Arc::new(Outstanding::default());
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = FlushWorker {
            database: database.to_string(),
            endpoint: endpoint.clone(),
            outstanding: outstanding.clone(),
            config: config.clone(),
            policy: config.retry_policy(),
        };
        let handle = tokio::spawn(worker.run(receiver));

        debug!(
            "Started line protocol transport for database '{}' at {}",
            database, settings.url
        );

        Ok(Self {
            database: database.to_string(),
            endpoint,
            outstanding,
            next_id: AtomicU64::new(0),
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Full write endpoint including query parameters.
    pub fn write_url(&self) -> &Url {
        &self.endpoint.write_url
    }
}

fn join(base: &Url, path: &str) -> Result<Url, WriteError> {
    // Keep any path prefix on the base URL.
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(path).map_err(|e| WriteError::InvalidConfig {
        message: format!("invalid endpoint path '{}': {}", path, e),
    })
}

#[async_trait]
impl WriteTransport for LineProtocolTransport {
    async fn submit(
        &self,
        request: WriteRequest,
        callbacks: Arc<dyn BatchCallbacks>,
    ) -> Result<(), WriteError> {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(WriteError::Closed {
                database: self.database.clone(),
            });
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Arc::new(request);
        self.outstanding.insert(id, request.clone(), callbacks);
        if sender.send((id, request)).is_err() {
            self.outstanding.take(id);
            return Err(WriteError::Closed {
                database: self.database.clone(),
            });
        }
        Ok(())
    }

    async fn ping(&self) -> bool {
        let request = self
            .endpoint
            .authorized(self.endpoint.client.get(self.endpoint.health_url.clone()));
        match request.send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                debug!("Time-series ping successful");
                true
            }
            Ok(response) => {
                debug!("Time-series ping failed with status: {}", response.status());
                false
            }
            Err(e) => {
                debug!("Time-series ping failed with exception: {}", e);
                false
            }
        }
    }

    async fn close(&self, timeout: Duration) -> Result<(), WriteError> {
        // Dropping the sender lets the worker flush what is buffered and exit.
        drop(self.sender.lock().take());
        let Some(mut handle) = self.worker.lock().take() else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(joined) => {
                joined.map_err(|e| WriteError::Transport(format!("flush task failed: {}", e)))
            }
            Err(_) => {
                handle.abort();
                let abandoned = self.outstanding.take_all();
                warn!(
                    "Flush task for '{}' did not finish within {:?}; abandoning {} requests",
                    self.database,
                    timeout,
                    abandoned.len()
                );
                let cause = WriteError::Closed {
                    database: self.database.clone(),
                };
                for (request, callbacks) in &abandoned {
                    callbacks.error(&request.descriptor(1), &request.body(), &cause);
                }
                Ok(())
            }
        }
    }
}

struct FlushWorker {
    database: String,
    endpoint: Arc<Endpoint>,
    outstanding: Arc<Outstanding>,
    config: BatchWriteConfig,
    policy: RetryPolicy,
}

impl FlushWorker {
    async fn run(self, mut receiver: mpsc::UnboundedReceiver<Submission>) {
        let mut buffer: Vec<Submission> = Vec::new();
        let mut buffered_lines = 0usize;
        let mut deadline: Option<Instant> = None;

        loop {
            let received = match deadline {
                Some(at) => tokio::select! {
                    received = receiver.recv() => Some(received),
                    _ = tokio::time::sleep_until(at) => None,
                },
                None => Some(receiver.recv().await),
            };

            match received {
                Some(Some(submission)) => {
                    buffered_lines += submission.1.lines.len();
                    buffer.push(submission);
                    if deadline.is_none() {
                        deadline = Some(Instant::now() + self.config.flush_delay());
                    }
                    if buffered_lines >= self.config.batch_size() {
                        self.flush(std::mem::take(&mut buffer)).await;
                        buffered_lines = 0;
                        deadline = None;
                    }
                }
                // Channel closed: final flush.
                Some(None) => {
                    self.flush(std::mem::take(&mut buffer)).await;
                    break;
                }
                // Flush interval elapsed.
                None => {
                    self.flush(std::mem::take(&mut buffer)).await;
                    buffered_lines = 0;
                    deadline = None;
                }
            }
        }
        debug!("Flush task for database '{}' stopped", self.database);
    }

    async fn flush(&self, batch: Vec<Submission>) {
        if batch.is_empty() {
            return;
        }
        let body = batch
            .iter()
            .flat_map(|(_, request)| request.lines.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n");
        let lines = body.lines().count();

        let mut retries = 0u32;
        loop {
            let attempt = retries + 1;
            let result = if body.is_empty() {
                Ok(())
            } else {
                self.endpoint.post(body.clone()).await
            };

            match result {
                Ok(()) => {
                    debug!(
                        "Flushed {} lines ({} requests) to '{}'",
                        lines,
                        batch.len(),
                        self.database
                    );
                    for (id, request) in &batch {
                        if let Some(callbacks) = self.outstanding.take(*id) {
                            callbacks.success(&request.descriptor(attempt));
                        }
                    }
                    return;
                }
                Err(e) if e.is_retryable() && self.policy.should_retry(retries) => {
                    let delay = self.policy.delay_for(retries);
                    info!(
                        "Retrying flush of {} lines to '{}' in {:?} (attempt {}): {}",
                        lines, self.database, delay, attempt, e
                    );
                    for (id, request) in &batch {
                        if let Some(callbacks) = self.outstanding.callbacks(*id) {
                            callbacks.retry(&request.descriptor(attempt), &request.body(), &e);
                        }
                    }
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                Err(e) => {
                    warn!(
                        "Giving up on flush of {} lines to '{}' after {} attempts: {}",
                        lines, self.database, attempt, e
                    );
                    for (id, request) in &batch {
                        if let Some(callbacks) = self.outstanding.take(*id) {
                            callbacks.error(&request.descriptor(attempt), &request.body(), &e);
                        }
                    }
                    return;
                }
            }
        }
    }
}

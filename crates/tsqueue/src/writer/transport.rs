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

//! Write transport seam.
//!
//! A transport accepts encoded write requests, drains them asynchronously and
//! reports each request's fate through [`BatchCallbacks`]: exactly one
//! `success` or `error` per request, with any number of `retry` calls
//! before it.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::error::WriteError;

/// Identifies the batch a callback refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDescriptor {
    pub database: String,
    pub table: String,
    pub rows: usize,
    /// 1-based attempt number the callback reports on.
    pub attempt: u32,
}

/// Lifecycle callbacks invoked by a transport.
pub trait BatchCallbacks: Send + Sync {
    /// The batch was written.
    fn success(&self, batch: &BatchDescriptor);

    /// The batch failed terminally and will not be retried.
    fn error(&self, batch: &BatchDescriptor, data: &str, cause: &WriteError);

    /// The batch failed transiently and will be attempted again.
    fn retry(&self, batch: &BatchDescriptor, data: &str, cause: &WriteError);
}

/// One encoded submission.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub database: String,
    pub table: String,
    pub ticker: String,
    pub tag_columns: Vec<String>,
    pub rows: usize,
    pub lines: Vec<String>,
}

impl WriteRequest {
    pub fn descriptor(&self, attempt: u32) -> BatchDescriptor {
        BatchDescriptor {
            database: self.database.clone(),
            table: self.table.clone(),
            rows: self.rows,
            attempt,
        }
    }

    /// Line protocol body.
    pub fn body(&self) -> String {
        self.lines.join("\n")
    }
}

/// Asynchronous sink for write requests.
#[async_trait]
pub trait WriteTransport: Send + Sync {
    /// Accepts a request for asynchronous delivery.
    ///
    /// `Ok` only means the request was accepted; its outcome arrives through
    /// `callbacks`. On `Err` no callback is invoked.
    async fn submit(
        &self,
        request: WriteRequest,
        callbacks: Arc<dyn BatchCallbacks>,
    ) -> Result<(), WriteError>;

    /// Whether the backend is reachable.
    async fn ping(&self) -> bool;

    /// Flushes buffered requests and releases the transport.
    ///
    /// Returns within `timeout`. Requests still unresolved by then are
    /// resolved through `error`.
    async fn close(&self, timeout: Duration) -> Result<(), WriteError>;
}

/// How a [`MemoryTransport`] resolves submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryMode {
    /// Resolve through `success`.
    Succeed,
    /// Report `retries` retries, then succeed.
    RetryThenSucceed { retries: u32 },
    /// Resolve through `error`.
    Fail,
    /// Refuse the submission synchronously.
    Reject,
    /// Accept and keep the callbacks until [`MemoryTransport::release_held`]
    /// or close, which resolves them through `error`.
    Hold,
}

type Held = (WriteRequest, Arc<dyn BatchCallbacks>);

/// In-process transport recording every accepted request.
pub struct MemoryTransport {
    mode: Mutex<MemoryMode>,
    requests: Mutex<Vec<WriteRequest>>,
    held: Mutex<Vec<Held>>,
    attached: Mutex<usize>,
    closed: Mutex<bool>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::with_mode(MemoryMode::Succeed)
    }

    pub fn with_mode(mode: MemoryMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            requests: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            attached: Mutex::new(0),
            closed: Mutex::new(false),
        }
    }

    pub fn set_mode(&self, mode: MemoryMode) {
        *self.mode.lock() = mode;
    }

    /// Accepted requests in submission order.
    pub fn requests(&self) -> Vec<WriteRequest> {
        self.requests.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    /// Registers one more writer sharing this transport and reopens it if
    /// closed. The transport closes once every attached writer has closed.
    pub fn attach(&self) {
        *self.attached.lock() += 1;
        *self.closed.lock() = false;
    }

    /// Resolves every held request through `success`.
    pub fn release_held(&self) -> usize {
        let held: Vec<Held> = std::mem::take(&mut *self.held.lock());
        for (request, callbacks) in &held {
            callbacks.success(&request.descriptor(1));
        }
        held.len()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WriteTransport for MemoryTransport {
    async fn submit(
        &self,
        request: WriteRequest,
        callbacks: Arc<dyn BatchCallbacks>,
    ) -> Result<(), WriteError> {
        if self.is_closed() {
            return Err(WriteError::Closed {
                database: request.database,
            });
        }
        let mode = *self.mode.lock();
        if mode == MemoryMode::Reject {
            return Err(WriteError::Transport("submission rejected".to_string()));
        }

        self.requests.lock().push(request.clone());
        let data = request.body();
        match mode {
            MemoryMode::Succeed => callbacks.success(&request.descriptor(1)),
            MemoryMode::RetryThenSucceed { retries } => {
                let cause = WriteError::Http {
                    status: 503,
                    body: "service unavailable".to_string(),
                };
                for attempt in 1..=retries {
                    callbacks.retry(&request.descriptor(attempt), &data, &cause);
                }
                callbacks.success(&request.descriptor(retries + 1));
            }
            MemoryMode::Fail => {
                let cause = WriteError::Http {
                    status: 400,
                    body: "rejected".to_string(),
                };
                callbacks.error(&request.descriptor(1), &data, &cause);
            }
            MemoryMode::Hold => self.held.lock().push((request, callbacks)),
            MemoryMode::Reject => {}
        }
        Ok(())
    }

    async fn ping(&self) -> bool {
        !self.is_closed()
    }

    async fn close(&self, _timeout: Duration) -> Result<(), WriteError> {
        {
            let mut attached = self.attached.lock();
            *attached = attached.saturating_sub(1);
            if *attached > 0 {
                return Ok(());
            }
        }
        *self.closed.lock() = true;
        let held: Vec<Held> = std::mem::take(&mut *self.held.lock());
        for (request, callbacks) in &held {
            let cause = WriteError::Closed {
                database: request.database.clone(),
            };
            callbacks.error(&request.descriptor(1), &request.body(), &cause);
        }
        Ok(())
    }
}

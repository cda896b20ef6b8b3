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

//! Writer construction.
//!
//! The daemon builds one writer per configured queue at startup and one-off
//! writers for override databases while running, so construction sits
//! behind a trait.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::WriteError;
use crate::writer::{BatchWriteConfig, BatchedWriter, MemoryMode, MemoryTransport};

#[cfg(feature = "http")]
use crate::config::InfluxSettings;
#[cfg(feature = "http")]
use crate::writer::LineProtocolTransport;

/// Builds writers for target databases.
pub trait WriterFactory: Send + Sync {
    fn create(&self, database: &str, config: BatchWriteConfig)
        -> Result<BatchedWriter, WriteError>;
}

/// Writers backed by [`LineProtocolTransport`].
#[cfg(feature = "http")]
pub struct HttpWriterFactory {
    settings: InfluxSettings,
}

#[cfg(feature = "http")]
impl HttpWriterFactory {
    pub fn new(settings: InfluxSettings) -> Self {
        Self { settings }
    }
}

#[cfg(feature = "http")]
impl WriterFactory for HttpWriterFactory {
    fn create(
        &self,
        database: &str,
        config: BatchWriteConfig,
    ) -> Result<BatchedWriter, WriteError> {
        let transport = LineProtocolTransport::new(&self.settings, database, &config)?;
        Ok(BatchedWriter::new(database, config, Arc::new(transport)))
    }
}

/// Writers backed by [`MemoryTransport`], one transport per database.
///
/// Every writer created for the same database shares its transport so the
/// recorded requests can be inspected afterwards. The transport closes
/// once every writer attached to it has closed.
pub struct MemoryWriterFactory {
    mode: MemoryMode,
    transports: Mutex<HashMap<String, Arc<MemoryTransport>>>,
    created: Mutex<Vec<(String, BatchWriteConfig)>>,
}

impl MemoryWriterFactory {
    pub fn new() -> Self {
        Self::with_mode(MemoryMode::Succeed)
    }

    pub fn with_mode(mode: MemoryMode) -> Self {
        Self {
            mode,
            transports: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Transport for `database`, if any writer was created for it.
    pub fn transport(&self, database: &str) -> Option<Arc<MemoryTransport>> {
        self.transports.lock().get(database).cloned()
    }

    /// Every `(database, config)` a writer was created with, in order.
    pub fn created(&self) -> Vec<(String, BatchWriteConfig)> {
        self.created.lock().clone()
    }
}

impl Default for MemoryWriterFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl WriterFactory for MemoryWriterFactory {
    fn create(
        &self,
        database: &str,
        config: BatchWriteConfig,
    ) -> Result<BatchedWriter, WriteError> {
        let transport = self
            .transports
            .lock()
            .entry(database.to_string())
            .or_insert_with(|| Arc::new(MemoryTransport::with_mode(self.mode)))
            .clone();
        transport.attach();
        self.created
            .lock()
            .push((database.to_string(), config.clone()));
        Ok(BatchedWriter::new(database, config, transport))
    }
}

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

//! Publisher configuration.
//!
//! Configuration is a YAML file listing the logical queues to drain, plus
//! optional connection settings. `${VAR}`, `${VAR:-default}` and
//! `${VAR:?message}` references are substituted from the environment before
//! parsing.
//!
//! ```yaml
//! queues:
//!   - name: ohlcv_queue
//!     table: ohlcv
//!     namespace: queue
//!     poll_interval: 2
//!   - name: backtest_metrics_queue
//!     table: backtest_metrics
//!     flush_interval: ${METRICS_FLUSH_MS:-10000}
//! drain_timeout_secs: 30
//! ```

pub mod error;
pub mod loader;
pub mod types;
pub mod validation;

pub use error::{ConfigError, ConfigValidationError};
pub use loader::{ConfigLoader, CONFIG_ENV_VAR};
pub use types::{InfluxSettings, PublisherConfig, QueueConfig, RedisSettings};
pub use validation::Validate;

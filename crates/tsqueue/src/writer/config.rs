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

//! Batch write configuration and retry policy.

use rand::Rng;
use std::time::Duration;

use crate::config::QueueConfig;
use crate::error::WriteError;

/// Batching, flushing and retry policy of a [`BatchedWriter`](super::BatchedWriter).
///
/// Immutable once built. Use [`BatchWriteConfig::builder()`]:
///
/// ```rust,ignore
/// let config = BatchWriteConfig::builder()
///     .batch_size(50_000)
///     .flush_interval(Duration::from_secs(10))
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BatchWriteConfig {
    batch_size: usize,
    flush_interval: Duration,
    jitter_interval: Duration,
    retry_interval: Duration,
    max_retries: u32,
    max_retry_delay: Duration,
    exponential_base: u32,
}

impl BatchWriteConfig {
    /// Creates a new configuration builder with default values.
    pub fn builder() -> BatchWriteConfigBuilder {
        BatchWriteConfigBuilder::default()
    }

    /// Fixed configuration for one-off writers targeting an override database.
    pub fn override_fallback() -> Self {
        Self {
            batch_size: 50_000,
            flush_interval: Duration::from_millis(10_000),
            ..Self::default()
        }
    }

    /// Builds the write policy for a configured queue.
    pub fn from_queue_config(config: &QueueConfig, batch_size: i64) -> Result<Self, WriteError> {
        Self::builder()
            .batch_size(batch_size)
            .flush_interval(Duration::from_millis(config.flush_interval))
            .jitter_interval(Duration::from_millis(config.jitter_interval))
            .retry_interval(Duration::from_millis(config.retry_interval))
            .max_retries(config.max_retries)
            .max_retry_delay(Duration::from_millis(config.max_retry_delay))
            .exponential_base(config.exponential_base)
            .build()
    }

    /// Number of rows buffered before a flush.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Maximum time rows sit in the buffer.
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Upper bound of the random delay added to flushes and retries.
    pub fn jitter_interval(&self) -> Duration {
        self.jitter_interval
    }

    /// Delay before the first retry.
    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Retries after the first attempt; zero disables retrying.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Cap on the backoff delay, jitter excluded.
    pub fn max_retry_delay(&self) -> Duration {
        self.max_retry_delay
    }

    pub fn exponential_base(&self) -> u32 {
        self.exponential_base
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_interval: self.retry_interval,
            max_retries: self.max_retries,
            max_retry_delay: self.max_retry_delay,
            exponential_base: self.exponential_base,
            jitter_interval: self.jitter_interval,
        }
    }

    /// Flush interval plus a random share of the jitter interval.
    pub fn flush_delay(&self) -> Duration {
        self.flush_interval + random_jitter(self.jitter_interval)
    }
}

impl Default for BatchWriteConfig {
    fn default() -> Self {
        BatchWriteConfigBuilder::default().config
    }
}

/// Builder for [`BatchWriteConfig`].
///
/// Size and retry count are taken as signed values so that out-of-range
/// input from configuration files is rejected by [`build`](Self::build)
/// rather than wrapped.
#[derive(Debug, Clone)]
pub struct BatchWriteConfigBuilder {
    config: BatchWriteConfig,
    batch_size: i64,
    max_retries: i64,
}

impl Default for BatchWriteConfigBuilder {
    fn default() -> Self {
        Self {
            config: BatchWriteConfig {
                batch_size: 100,
                flush_interval: Duration::from_millis(10_000),
                jitter_interval: Duration::from_millis(2_000),
                retry_interval: Duration::from_millis(5_000),
                max_retries: 5,
                max_retry_delay: Duration::from_millis(30_000),
                exponential_base: 2,
            },
            batch_size: 100,
            max_retries: 5,
        }
    }
}

impl BatchWriteConfigBuilder {
    /// Sets the batch size. Must be positive.
    pub fn batch_size(mut self, value: i64) -> Self {
        self.batch_size = value;
        self
    }

    pub fn flush_interval(mut self, value: Duration) -> Self {
        self.config.flush_interval = value;
        self
    }

    pub fn jitter_interval(mut self, value: Duration) -> Self {
        self.config.jitter_interval = value;
        self
    }

    pub fn retry_interval(mut self, value: Duration) -> Self {
        self.config.retry_interval = value;
        self
    }

    /// Sets the retry count. Must not be negative.
    pub fn max_retries(mut self, value: i64) -> Self {
        self.max_retries = value;
        self
    }

    pub fn max_retry_delay(mut self, value: Duration) -> Self {
        self.config.max_retry_delay = value;
        self
    }

    pub fn exponential_base(mut self, value: u32) -> Self {
        self.config.exponential_base = value;
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> Result<BatchWriteConfig, WriteError> {
        if self.batch_size <= 0 {
            return Err(WriteError::InvalidConfig {
                message: "batch_size must be positive".to_string(),
            });
        }
        if self.max_retries < 0 {
            return Err(WriteError::InvalidConfig {
                message: "max_retries cannot be negative".to_string(),
            });
        }
        if self.config.exponential_base == 0 {
            return Err(WriteError::InvalidConfig {
                message: "exponential_base must be at least 1".to_string(),
            });
        }

        let batch_size = usize::try_from(self.batch_size).map_err(|_| WriteError::InvalidConfig {
            message: format!("batch_size {} is too large", self.batch_size),
        })?;
        let max_retries = u32::try_from(self.max_retries).map_err(|_| WriteError::InvalidConfig {
            message: format!("max_retries {} is too large", self.max_retries),
        })?;

        Ok(BatchWriteConfig {
            batch_size,
            max_retries,
            ..self.config
        })
    }
}

/// Exponential backoff with jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    retry_interval: Duration,
    max_retries: u32,
    max_retry_delay: Duration,
    exponential_base: u32,
    jitter_interval: Duration,
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `retries` retries.
    pub fn should_retry(&self, retries: u32) -> bool {
        retries < self.max_retries
    }

    /// `min(retry_interval * base^retry, max_retry_delay)` for the zero-based
    /// retry number.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = self.exponential_base.checked_pow(retry).unwrap_or(u32::MAX);
        self.retry_interval
            .checked_mul(factor)
            .unwrap_or(self.max_retry_delay)
            .min(self.max_retry_delay)
    }

    /// [`base_delay`](Self::base_delay) plus up to `jitter_interval` of
    /// random jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay(retry) + random_jitter(self.jitter_interval)
    }
}

fn random_jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

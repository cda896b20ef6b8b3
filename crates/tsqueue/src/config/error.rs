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

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found in any search location: {searched:?}")]
    ConfigNotFound { searched: Vec<PathBuf> },

    #[error("Failed to read configuration file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse YAML configuration: {0}")]
    YamlParseError(#[from] serde_yaml::Error),

    #[error("Environment variable substitution failed: {0}")]
    EnvSubstitutionError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ConfigValidationError),

    #[error("Unsupported configuration file format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Unknown queue '{name}'. Must be one of: {known}")]
    UnknownQueue { name: String, known: String },

    #[error(
        "Batch size for '{queue}' must be {required}. Attempted to use {attempted}. This is a protected constant."
    )]
    ProtectedBatchSize {
        queue: String,
        required: i64,
        attempted: i64,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    #[error("No queues configured")]
    NoQueues,

    #[error("Queue entry {index} has an empty name")]
    EmptyQueueName { index: usize },

    #[error("Queue '{queue}' has an empty table name")]
    EmptyTable { queue: String },

    #[error("Queue '{name}' is configured more than once")]
    DuplicateQueue { name: String },

    #[error("Invalid poll interval for '{queue}': {value} (must be positive)")]
    InvalidPollInterval { queue: String, value: f64 },

    #[error("Invalid drain timeout: {value} (must be positive)")]
    InvalidDrainTimeout { value: u64 },

    #[error("Multiple validation errors: {errors:?}")]
    Multiple { errors: Vec<ConfigValidationError> },
}

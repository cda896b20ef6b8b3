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

//! Typed decoding of queued payloads.
//!
//! Producers enqueue loosely shaped JSON. Everything the daemon needs is
//! decoded here, once, into a [`QueuePayload`]; anything that does not fit is
//! a [`ValidationError`] and the item is dropped.
//!
//! ```json
//! {
//!   "ticker": "AAPL",
//!   "candles": { "datetime": [1700000000000], "close": [100.0] },
//!   "strategy_name": "sma_crossover",
//!   "hash": "3f2a",
//!   "strategy_params": { "short": 10, "long": 20 },
//!   "database": "override-db"
//! }
//! ```

mod frame;

pub use frame::{Cell, ColumnValues, SeriesFrame, DATETIME_COLUMN};

use serde::Deserialize;
use serde_json::Value;

use crate::error::ValidationError;

/// Which field carried the time-series body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyField {
    Candles,
    Data,
}

impl BodyField {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyField::Candles => "candles",
            BodyField::Data => "data",
        }
    }
}

/// Wire shape before validation.
#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default)]
    ticker: Option<String>,
    #[serde(default)]
    candles: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    strategy_name: Option<Value>,
    #[serde(default)]
    backtest_id: Option<Value>,
    #[serde(default)]
    hash: Option<Value>,
    #[serde(default)]
    hash_id: Option<Value>,
    #[serde(default)]
    strategy_params: Option<Value>,
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    portfolio_stage: Option<String>,
}

/// A validated queue payload.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuePayload {
    pub ticker: String,
    pub body_field: BodyField,
    pub frame: SeriesFrame,
    pub strategy_name: Option<String>,
    pub backtest_id: Option<String>,
    /// Canonical hash, taken from `hash` or the legacy `hash_id`.
    pub hash: Option<String>,
    /// Scalar strategy parameters in declaration order.
    pub strategy_params: Vec<(String, Value)>,
    /// Override target database.
    pub database: Option<String>,
    pub portfolio_stage: Option<String>,
}

impl QueuePayload {
    /// Decodes and validates a raw payload.
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        let raw: RawPayload =
            serde_json::from_value(value).map_err(|e| ValidationError::InvalidShape {
                message: e.to_string(),
            })?;

        let ticker = raw
            .ticker
            .filter(|t| !t.is_empty())
            .ok_or(ValidationError::MissingTicker)?;

        let (body_field, body) = select_body(raw.candles, raw.data)?;
        let frame = match body {
            Value::Object(map) => SeriesFrame::from_column_map(map)?,
            Value::Array(rows) => SeriesFrame::from_rows(rows)?,
            other => {
                return Err(ValidationError::InvalidShape {
                    message: format!(
                        "'{}' must be an object or array, got {}",
                        body_field.as_str(),
                        other
                    ),
                })
            }
        };

        let strategy_params = match raw.strategy_params {
            Some(Value::Object(map)) => map.into_iter().collect(),
            _ => Vec::new(),
        };

        Ok(Self {
            ticker,
            body_field,
            frame,
            strategy_name: scalar_text(raw.strategy_name),
            backtest_id: scalar_text(raw.backtest_id),
            hash: scalar_text(raw.hash).or_else(|| scalar_text(raw.hash_id)),
            strategy_params,
            database: non_empty(raw.database),
            portfolio_stage: non_empty(raw.portfolio_stage),
        })
    }

    /// Number of rows in the body.
    pub fn row_count(&self) -> usize {
        self.frame.len()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Text of an identifier field that producers send as a string or a number.
/// Empty strings, zero and non-scalar values count as absent.
fn scalar_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

fn is_empty_body(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(rows) => rows.is_empty(),
        _ => false,
    }
}

/// `candles` wins over `data` unless it is empty.
fn select_body(
    candles: Option<Value>,
    data: Option<Value>,
) -> Result<(BodyField, Value), ValidationError> {
    let present = candles.is_some() || data.is_some();
    if let Some(candles) = candles.filter(|v| !is_empty_body(v)) {
        return Ok((BodyField::Candles, candles));
    }
    if let Some(data) = data.filter(|v| !is_empty_body(v)) {
        return Ok((BodyField::Data, data));
    }
    if present {
        Err(ValidationError::EmptyBody)
    } else {
        Err(ValidationError::MissingBody)
    }
}

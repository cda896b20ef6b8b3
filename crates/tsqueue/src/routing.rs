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

//! Queue routing and tag normalization.
//!
//! Every logical queue maps to a fixed target database and batch size. For
//! the backtest family the output table and tag columns also depend on the
//! payload: strategy name, hash, legacy backtest id and strategy parameters.

use serde_json::Value;
use tracing::warn;

use crate::config::{ConfigError, QueueConfig};
use crate::payload::{ColumnValues, QueuePayload, SeriesFrame};

pub const OHLCV_DATABASE: &str = "ohlcv";
pub const FUNDAMENTALS_DATABASE: &str = "algo-trader-fundamentals";
pub const TRADING_JOURNAL_DATABASE: &str = "algo-trader-trading-journal";

pub const OHLCV_BATCH_SIZE: i64 = 300_000;
pub const FUNDAMENTALS_BATCH_SIZE: i64 = 50_000;
pub const TRADING_JOURNAL_BATCH_SIZE: i64 = 50_000;
pub const BACKTEST_BATCH_SIZE: i64 = 50_000;

/// Substituted for null or empty tag values; line protocol rejects empty tags.
pub const TAG_PLACEHOLDER: &str = "unknown";

/// Tag that travels separately from the frame.
pub const TICKER_TAG: &str = "ticker";

/// Known logical queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Ohlcv,
    Fundamentals,
    TradingJournal,
    BacktestTrades,
    BacktestMetrics,
    BacktestStudies,
}

impl QueueKind {
    pub const ALL: [QueueKind; 6] = [
        QueueKind::Ohlcv,
        QueueKind::Fundamentals,
        QueueKind::TradingJournal,
        QueueKind::BacktestTrades,
        QueueKind::BacktestMetrics,
        QueueKind::BacktestStudies,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            QueueKind::Ohlcv => "ohlcv_queue",
            QueueKind::Fundamentals => "fundamentals_queue",
            QueueKind::TradingJournal => "trading_journal_queue",
            QueueKind::BacktestTrades => "backtest_trades_queue",
            QueueKind::BacktestMetrics => "backtest_metrics_queue",
            QueueKind::BacktestStudies => "backtest_studies_queue",
        }
    }

    pub fn database(&self) -> &'static str {
        match self {
            QueueKind::Ohlcv => OHLCV_DATABASE,
            QueueKind::Fundamentals => FUNDAMENTALS_DATABASE,
            QueueKind::TradingJournal
            | QueueKind::BacktestTrades
            | QueueKind::BacktestMetrics
            | QueueKind::BacktestStudies => TRADING_JOURNAL_DATABASE,
        }
    }

    pub fn batch_size(&self) -> i64 {
        match self {
            QueueKind::Ohlcv => OHLCV_BATCH_SIZE,
            QueueKind::Fundamentals => FUNDAMENTALS_BATCH_SIZE,
            QueueKind::TradingJournal => TRADING_JOURNAL_BATCH_SIZE,
            QueueKind::BacktestTrades
            | QueueKind::BacktestMetrics
            | QueueKind::BacktestStudies => BACKTEST_BATCH_SIZE,
        }
    }

    /// Queues whose batch size may not be overridden.
    pub fn is_batch_size_protected(&self) -> bool {
        matches!(self, QueueKind::Ohlcv)
    }

    pub fn is_backtest(&self) -> bool {
        matches!(
            self,
            QueueKind::BacktestTrades | QueueKind::BacktestMetrics | QueueKind::BacktestStudies
        )
    }

    /// Raw trades share one measurement, so strategy parameters stay out of it.
    pub fn flattens_strategy_params(&self) -> bool {
        matches!(self, QueueKind::BacktestMetrics | QueueKind::BacktestStudies)
    }

    fn known_names() -> String {
        Self::ALL
            .iter()
            .map(QueueKind::name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A configured queue resolved against the routing table.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueRoute {
    pub kind: QueueKind,
    pub database: &'static str,
    pub batch_size: i64,
}

impl QueueRoute {
    /// Resolves a queue entry, rejecting unknown names and overrides of
    /// protected batch sizes.
    pub fn resolve(config: &QueueConfig) -> Result<Self, ConfigError> {
        let kind = QueueKind::from_name(&config.name).ok_or_else(|| ConfigError::UnknownQueue {
            name: config.name.clone(),
            known: QueueKind::known_names(),
        })?;

        let batch_size = match config.batch_size {
            Some(attempted) if kind.is_batch_size_protected() && attempted != kind.batch_size() => {
                return Err(ConfigError::ProtectedBatchSize {
                    queue: config.name.clone(),
                    required: kind.batch_size(),
                    attempted,
                })
            }
            Some(size) => size,
            None => kind.batch_size(),
        };

        Ok(Self {
            kind,
            database: kind.database(),
            batch_size,
        })
    }
}

/// Output table and tag columns for one payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePlan {
    pub table: String,
    pub tag_columns: Vec<String>,
}

impl RoutePlan {
    /// Resolves the output table and tag columns, broadcasting payload-level
    /// values into the frame as tag columns.
    ///
    /// Columns already present in the body are kept as sent.
    pub fn resolve(kind: QueueKind, default_table: &str, payload: &mut QueuePayload) -> Self {
        let mut plan = RoutePlan {
            table: default_table.to_string(),
            tag_columns: vec![TICKER_TAG.to_string()],
        };
        if !kind.is_backtest() {
            return plan;
        }

        if let Some(strategy) = payload.strategy_name.as_deref() {
            let phase1 = payload.portfolio_stage.as_deref() == Some("phase1");
            match kind {
                QueueKind::BacktestTrades if phase1 => plan.table = "local_trades".to_string(),
                QueueKind::BacktestTrades => plan.table = "trades".to_string(),
                QueueKind::BacktestMetrics => plan.table = format!("{}_summary", strategy),
                QueueKind::BacktestStudies => plan.table = strategy.to_string(),
                _ => {}
            }
        }

        let frame = &mut payload.frame;

        // Legacy id only survives for metrics.
        if kind == QueueKind::BacktestMetrics {
            if let Some(backtest_id) = payload.backtest_id.as_deref() {
                plan.broadcast_tag(frame, "backtest_id", backtest_id);
            }
        }
        if let Some(hash) = payload.hash.as_deref() {
            plan.broadcast_tag(frame, "hash", hash);
        }
        if let Some(strategy) = payload.strategy_name.as_deref() {
            plan.broadcast_tag(frame, "strategy", strategy);
        }

        if kind.flattens_strategy_params() {
            for (raw_key, value) in &payload.strategy_params {
                let key = match raw_key.as_str() {
                    "side" => continue,
                    "short" => "short_window",
                    "long" => "long_window",
                    other => other,
                };
                plan.broadcast_tag(frame, key, &param_to_string(value));
            }
        }

        plan
    }

    fn broadcast_tag(&mut self, frame: &mut SeriesFrame, name: &str, value: &str) {
        frame.insert_broadcast(name, value);
        if !self.tag_columns.iter().any(|t| t == name) {
            self.tag_columns.push(name.to_string());
        }
    }
}

fn param_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Converts every tag column except `ticker` to strings, replacing null and
/// empty values with [`TAG_PLACEHOLDER`].
///
/// Returns how many values were replaced.
pub fn normalize_tags(frame: &mut SeriesFrame, tags: &[String]) -> usize {
    let mut total = 0;
    for tag in tags.iter().filter(|t| *t != TICKER_TAG) {
        let Some(column) = frame.column_mut(tag) else {
            continue;
        };
        let (strings, replaced) = column.to_tag_strings(TAG_PLACEHOLDER);
        *column = ColumnValues::Text(strings.into_iter().map(Some).collect());
        if replaced > 0 {
            warn!(
                "Found {} None/empty values in tag column '{}', replacing with '{}' placeholder",
                replaced, tag, TAG_PLACEHOLDER
            );
        }
        total += replaced;
    }
    total
}

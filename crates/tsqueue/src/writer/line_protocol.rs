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

//! Line protocol encoding.
//!
//! One line per row: `table,ticker=AAPL,tag=v field=1.5,count=3i 1700000000000000000`.
//! Timestamps are nanoseconds. Rows without any non-null field are skipped
//! since the protocol requires at least one field.

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::error::WriteError;
use crate::payload::{Cell, SeriesFrame};
use crate::routing::TICKER_TAG;

const NANOS_PER_MILLI: i64 = 1_000_000;

/// Encodes every row of `frame` into line protocol.
pub fn encode_frame(
    table: &str,
    ticker: &str,
    tag_columns: &[String],
    frame: &SeriesFrame,
) -> Result<Vec<String>, WriteError> {
    if table.is_empty() {
        return Err(WriteError::Encode {
            table: table.to_string(),
            message: "table name is empty".to_string(),
        });
    }

    let tag_set: HashSet<&str> = tag_columns.iter().map(String::as_str).collect();
    let tags: Vec<_> = frame
        .columns()
        .iter()
        .filter(|(name, _)| name != TICKER_TAG && tag_set.contains(name.as_str()))
        .collect();
    let fields: Vec<_> = frame
        .columns()
        .iter()
        .filter(|(name, _)| name != TICKER_TAG && !tag_set.contains(name.as_str()))
        .collect();

    let mut prefix = escape_key(table, false);
    prefix.push(',');
    prefix.push_str(TICKER_TAG);
    prefix.push('=');
    prefix.push_str(&escape_key(ticker, true));

    let mut lines = Vec::with_capacity(frame.len());
    for (row, millis) in frame.datetime().iter().enumerate() {
        let timestamp = millis
            .checked_mul(NANOS_PER_MILLI)
            .ok_or_else(|| WriteError::Encode {
                table: table.to_string(),
                message: format!("timestamp {} out of range", millis),
            })?;

        let mut line = prefix.clone();
        for (name, values) in &tags {
            if let Some(value) = values.cell(row).map(cell_to_tag) {
                if value.is_empty() {
                    continue;
                }
                let _ = write!(line, ",{}={}", escape_key(name, true), escape_key(&value, true));
            }
        }

        let mut field_count = 0;
        for (name, values) in &fields {
            let Some(value) = values.cell(row).and_then(cell_to_field) else {
                continue;
            };
            line.push(if field_count == 0 { ' ' } else { ',' });
            let _ = write!(line, "{}={}", escape_key(name, true), value);
            field_count += 1;
        }
        if field_count == 0 {
            continue;
        }

        let _ = write!(line, " {}", timestamp);
        lines.push(line);
    }

    Ok(lines)
}

fn cell_to_tag(cell: Cell<'_>) -> String {
    match cell {
        Cell::Text(s) => s.to_string(),
        Cell::Float(f) => f.to_string(),
        Cell::Integer(i) => i.to_string(),
        Cell::Boolean(b) => b.to_string(),
    }
}

fn cell_to_field(cell: Cell<'_>) -> Option<String> {
    match cell {
        Cell::Float(f) if f.is_finite() => Some(f.to_string()),
        Cell::Float(_) => None,
        Cell::Integer(i) => Some(format!("{}i", i)),
        Cell::Boolean(b) => Some(b.to_string()),
        Cell::Text(s) => Some(format!("\"{}\"", escape_string_field(s))),
    }
}

/// Escapes measurement names (`equals == false`) and tag keys, tag values and
/// field keys (`equals == true`).
fn escape_key(raw: &str, equals: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            ',' | ' ' => {
                out.push('\\');
                out.push(c);
            }
            '=' if equals => out.push_str("\\="),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_string_field(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

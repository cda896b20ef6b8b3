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

//! Columnar time-series frames.
//!
//! Producers send either a column map (`{"datetime": [...], "close": [...]}`)
//! or an array of row objects. Both are normalized into a [`SeriesFrame`]:
//! a `datetime` vector of epoch milliseconds plus an ordered list of typed
//! columns, each exactly as long as `datetime`.

use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Name of the mandatory timestamp column.
pub const DATETIME_COLUMN: &str = "datetime";

/// Values of one column. Every variant holds one optional entry per row.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Float(Vec<Option<f64>>),
    Integer(Vec<Option<i64>>),
    Boolean(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
}

/// A borrowed single cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    Float(f64),
    Integer(i64),
    Boolean(bool),
    Text(&'a str),
}

impl ColumnValues {
    /// Infers a column type from JSON values.
    ///
    /// Nulls are ignored for inference. All-boolean columns become
    /// [`Boolean`](Self::Boolean), all-integer columns
    /// [`Integer`](Self::Integer), integers mixed with floats widen to
    /// [`Float`](Self::Float), and anything else becomes [`Text`](Self::Text).
    pub fn from_json(values: Vec<Value>) -> Self {
        let non_null = || values.iter().filter(|v| !v.is_null());

        if non_null().all(Value::is_boolean) && non_null().next().is_some() {
            return ColumnValues::Boolean(values.iter().map(Value::as_bool).collect());
        }
        if non_null().all(|v| v.is_i64()) && non_null().next().is_some() {
            return ColumnValues::Integer(values.iter().map(Value::as_i64).collect());
        }
        if non_null().all(Value::is_number) && non_null().next().is_some() {
            return ColumnValues::Float(values.iter().map(Value::as_f64).collect());
        }
        ColumnValues::Text(values.into_iter().map(value_to_text).collect())
    }

    /// A text column repeating `value` for `len` rows.
    pub fn broadcast_text(value: &str, len: usize) -> Self {
        ColumnValues::Text(vec![Some(value.to_string()); len])
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Float(v) => v.len(),
            ColumnValues::Integer(v) => v.len(),
            ColumnValues::Boolean(v) => v.len(),
            ColumnValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The cell at `row`, `None` for nulls and out-of-range rows.
    pub fn cell(&self, row: usize) -> Option<Cell<'_>> {
        match self {
            ColumnValues::Float(v) => v.get(row).copied().flatten().map(Cell::Float),
            ColumnValues::Integer(v) => v.get(row).copied().flatten().map(Cell::Integer),
            ColumnValues::Boolean(v) => v.get(row).copied().flatten().map(Cell::Boolean),
            ColumnValues::Text(v) => v
                .get(row)
                .and_then(|s| s.as_deref())
                .map(Cell::Text),
        }
    }

    /// Converts every entry to a string, replacing nulls and empty strings
    /// with `placeholder`.
    ///
    /// Returns the string column and how many entries were replaced.
    pub fn to_tag_strings(&self, placeholder: &str) -> (Vec<String>, usize) {
        let mut replaced = 0;
        let mut fill = |s: Option<String>| match s {
            Some(s) if !s.is_empty() => s,
            _ => {
                replaced += 1;
                placeholder.to_string()
            }
        };
        let strings = match self {
            ColumnValues::Float(v) => v.iter().map(|x| fill(x.map(|f| f.to_string()))).collect(),
            ColumnValues::Integer(v) => v.iter().map(|x| fill(x.map(|i| i.to_string()))).collect(),
            ColumnValues::Boolean(v) => v.iter().map(|x| fill(x.map(|b| b.to_string()))).collect(),
            ColumnValues::Text(v) => v.iter().map(|x| fill(x.clone())).collect(),
        };
        (strings, replaced)
    }
}

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Parses one timestamp cell into epoch milliseconds.
///
/// Integers are taken as-is, floats are truncated, and strings may hold
/// either an integer or an RFC 3339 timestamp.
fn parse_timestamp(index: usize, value: &Value) -> Result<i64, ValidationError> {
    let invalid = || ValidationError::InvalidTimestamp {
        index,
        value: value.to_string(),
    };
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .ok_or_else(invalid),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| {
                chrono::DateTime::parse_from_rfc3339(s.trim())
                    .ok()
                    .map(|dt| dt.timestamp_millis())
            })
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

/// A validated columnar frame.
///
/// Invariant: every column has exactly `datetime.len()` entries, and no
/// column is named `datetime`.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFrame {
    datetime: Vec<i64>,
    columns: Vec<(String, ColumnValues)>,
}

impl SeriesFrame {
    /// Builds a frame, checking the column length invariant.
    pub fn new(
        datetime: Vec<i64>,
        columns: Vec<(String, ColumnValues)>,
    ) -> Result<Self, ValidationError> {
        if datetime.is_empty() {
            return Err(ValidationError::EmptyDatetime);
        }
        for (name, values) in &columns {
            if name == DATETIME_COLUMN {
                return Err(ValidationError::InvalidShape {
                    message: "duplicate 'datetime' column".to_string(),
                });
            }
            if values.len() != datetime.len() {
                return Err(ValidationError::ColumnLength {
                    column: name.clone(),
                    expected: datetime.len(),
                    actual: values.len(),
                });
            }
        }
        Ok(Self { datetime, columns })
    }

    /// Decodes a column map body.
    pub fn from_column_map(map: Map<String, Value>) -> Result<Self, ValidationError> {
        if map.is_empty() {
            return Err(ValidationError::EmptyBody);
        }
        let mut datetime_values = None;
        let mut columns = Vec::with_capacity(map.len());
        for (name, value) in map {
            let Value::Array(values) = value else {
                return Err(ValidationError::InvalidShape {
                    message: format!("column '{}' is not an array", name),
                });
            };
            if name == DATETIME_COLUMN {
                datetime_values = Some(values);
            } else {
                columns.push((name, values));
            }
        }

        let datetime_values = match datetime_values {
            Some(values) if !values.is_empty() => values,
            _ => return Err(ValidationError::EmptyDatetime),
        };
        let datetime = datetime_values
            .iter()
            .enumerate()
            .map(|(i, v)| parse_timestamp(i, v))
            .collect::<Result<Vec<_>, _>>()?;

        let columns = columns
            .into_iter()
            .map(|(name, values)| (name, ColumnValues::from_json(values)))
            .collect();
        Self::new(datetime, columns)
    }

    /// Decodes a row array body.
    ///
    /// Column order follows first appearance across rows; keys missing from a
    /// row become nulls.
    pub fn from_rows(rows: Vec<Value>) -> Result<Self, ValidationError> {
        if rows.is_empty() {
            return Err(ValidationError::EmptyBody);
        }
        let row_count = rows.len();
        let mut datetime = Vec::with_capacity(row_count);
        let mut names: Vec<String> = Vec::new();
        let mut cells: Vec<Vec<Value>> = Vec::new();

        for (index, row) in rows.into_iter().enumerate() {
            let Value::Object(fields) = row else {
                return Err(ValidationError::InvalidShape {
                    message: format!("row {} is not an object", index),
                });
            };
            let mut saw_datetime = false;
            for (name, value) in fields {
                if name == DATETIME_COLUMN {
                    datetime.push(parse_timestamp(index, &value)?);
                    saw_datetime = true;
                    continue;
                }
                let position = match names.iter().position(|n| *n == name) {
                    Some(position) => position,
                    None => {
                        names.push(name);
                        cells.push(vec![Value::Null; index]);
                        names.len() - 1
                    }
                };
                cells[position].push(value);
            }
            if !saw_datetime {
                return Err(ValidationError::EmptyDatetime);
            }
            // Pad columns this row did not mention.
            for column in cells.iter_mut() {
                if column.len() < index + 1 {
                    column.push(Value::Null);
                }
            }
        }

        let columns = names
            .into_iter()
            .zip(cells)
            .map(|(name, values)| (name, ColumnValues::from_json(values)))
            .collect();
        Self::new(datetime, columns)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.datetime.len()
    }

    /// Always `false` for a validated frame; kept for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.datetime.is_empty()
    }

    /// Epoch-millisecond timestamps.
    pub fn datetime(&self) -> &[i64] {
        &self.datetime
    }

    /// Columns in order.
    pub fn columns(&self) -> &[(String, ColumnValues)] {
        &self.columns
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnValues> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values)
    }

    /// Mutable access for in-place conversions. Callers must keep the length.
    pub(crate) fn column_mut(&mut self, name: &str) -> Option<&mut ColumnValues> {
        self.columns
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values)
    }

    /// Whether a column exists.
    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Adds a text column repeating `value` unless `name` already exists.
    ///
    /// Returns `true` if the column was added.
    pub fn insert_broadcast(&mut self, name: &str, value: &str) -> bool {
        if name == DATETIME_COLUMN || self.contains(name) {
            return false;
        }
        self.columns.push((
            name.to_string(),
            ColumnValues::broadcast_text(value, self.len()),
        ));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_column_map_infers_types() {
        let frame = SeriesFrame::from_column_map(as_map(json!({
            "datetime": [1700000000000i64, 1700000060000i64],
            "close": [100.5, 101],
            "volume": [10, 20],
            "halted": [false, null],
            "note": ["a", 3],
        })))
        .unwrap();

        assert_eq!(frame.len(), 2);
        assert_eq!(frame.datetime(), &[1700000000000, 1700000060000]);
        assert_eq!(
            frame.column("close"),
            Some(&ColumnValues::Float(vec![Some(100.5), Some(101.0)]))
        );
        assert_eq!(
            frame.column("volume"),
            Some(&ColumnValues::Integer(vec![Some(10), Some(20)]))
        );
        assert_eq!(
            frame.column("halted"),
            Some(&ColumnValues::Boolean(vec![Some(false), None]))
        );
        assert_eq!(
            frame.column("note"),
            Some(&ColumnValues::Text(vec![
                Some("a".to_string()),
                Some("3".to_string())
            ]))
        );
        // Declaration order is preserved.
        let names: Vec<_> = frame.columns().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["close", "volume", "halted", "note"]);
    }

    #[test]
    fn test_column_map_rejects_empty_or_missing_datetime() {
        assert_eq!(
            SeriesFrame::from_column_map(as_map(json!({"datetime": []}))),
            Err(ValidationError::EmptyDatetime)
        );
        assert_eq!(
            SeriesFrame::from_column_map(as_map(json!({"close": [1.0]}))),
            Err(ValidationError::EmptyDatetime)
        );
        assert_eq!(
            SeriesFrame::from_column_map(Map::new()),
            Err(ValidationError::EmptyBody)
        );
    }

    #[test]
    fn test_column_map_rejects_ragged_columns() {
        let err = SeriesFrame::from_column_map(as_map(json!({
            "datetime": [1, 2, 3],
            "close": [1.0, 2.0],
        })))
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::ColumnLength {
                column: "close".to_string(),
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_rows_are_pivoted_into_columns() {
        let frame = SeriesFrame::from_rows(vec![
            json!({"datetime": 1, "open": 1.0, "close": 2.0}),
            json!({"datetime": 2, "close": 3.0, "side": "LONG"}),
        ])
        .unwrap();

        assert_eq!(frame.datetime(), &[1, 2]);
        assert_eq!(
            frame.column("open"),
            Some(&ColumnValues::Float(vec![Some(1.0), None]))
        );
        assert_eq!(
            frame.column("close"),
            Some(&ColumnValues::Float(vec![Some(2.0), Some(3.0)]))
        );
        assert_eq!(
            frame.column("side"),
            Some(&ColumnValues::Text(vec![None, Some("LONG".to_string())]))
        );
    }

    #[test]
    fn test_rows_require_datetime_and_objects() {
        assert_eq!(
            SeriesFrame::from_rows(vec![json!({"close": 1.0})]),
            Err(ValidationError::EmptyDatetime)
        );
        assert!(matches!(
            SeriesFrame::from_rows(vec![json!([1, 2])]),
            Err(ValidationError::InvalidShape { .. })
        ));
        assert_eq!(SeriesFrame::from_rows(vec![]), Err(ValidationError::EmptyBody));
    }

    #[test]
    fn test_timestamps_accept_strings_and_floats() {
        let frame = SeriesFrame::from_column_map(as_map(json!({
            "datetime": ["1700000000000", 1700000000001.9, "2023-11-14T22:13:20Z"],
        })))
        .unwrap();
        assert_eq!(
            frame.datetime(),
            &[1700000000000, 1700000000001, 1700000000000]
        );

        assert!(matches!(
            SeriesFrame::from_column_map(as_map(json!({"datetime": [true]}))),
            Err(ValidationError::InvalidTimestamp { index: 0, .. })
        ));
    }

    #[test]
    fn test_tag_strings_replace_nulls_and_empties() {
        let column = ColumnValues::Text(vec![Some("a".into()), None, Some(String::new())]);
        let (strings, replaced) = column.to_tag_strings("unknown");
        assert_eq!(strings, vec!["a", "unknown", "unknown"]);
        assert_eq!(replaced, 2);

        let column = ColumnValues::Integer(vec![Some(10), None]);
        let (strings, replaced) = column.to_tag_strings("unknown");
        assert_eq!(strings, vec!["10", "unknown"]);
        assert_eq!(replaced, 1);
    }

    #[test]
    fn test_insert_broadcast_keeps_existing_column() {
        let mut frame = SeriesFrame::new(
            vec![1, 2],
            vec![(
                "strategy".to_string(),
                ColumnValues::Text(vec![Some("a".into()), Some("b".into())]),
            )],
        )
        .unwrap();
        assert!(!frame.insert_broadcast("strategy", "sma"));
        assert!(frame.insert_broadcast("hash", "abc"));
        assert_eq!(
            frame.column("hash"),
            Some(&ColumnValues::broadcast_text("abc", 2))
        );
        assert_eq!(frame.cell_text("strategy", 1), Some("b"));
    }

    impl SeriesFrame {
        fn cell_text(&self, name: &str, row: usize) -> Option<&str> {
            match self.column(name)?.cell(row)? {
                Cell::Text(s) => Some(s),
                _ => None,
            }
        }
    }
}

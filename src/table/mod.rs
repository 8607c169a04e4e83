//! Typed in-memory table: the dataset representation behind every project.
//!
//! A table is an ordered map of column name → typed column, where each column
//! is a dense array with a null mask (`Vec<Option<T>>`). The type of every
//! cell is decided once at ingestion; readers never re-infer. Serialized
//! column-major with serde, which round-trips all five types (including
//! timezone-aware datetimes) through the on-disk dataset file.

pub mod infer;

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of a column, surfaced to clients as `column_types`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    Datetime,
    String,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Bool => "bool",
            ColumnType::Datetime => "datetime",
            ColumnType::String => "string",
        }
    }
}

/// One typed column with a null mask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Column {
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Datetime(Vec<Option<DateTime<Utc>>>),
    Text(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Datetime(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Column::Int(_) => ColumnType::Int,
            Column::Float(_) => ColumnType::Float,
            Column::Bool(_) => ColumnType::Bool,
            Column::Datetime(_) => ColumnType::Datetime,
            Column::Text(_) => ColumnType::String,
        }
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            Column::Int(v) => v.get(row).map_or(true, Option::is_none),
            Column::Float(v) => v.get(row).map_or(true, Option::is_none),
            Column::Bool(v) => v.get(row).map_or(true, Option::is_none),
            Column::Datetime(v) => v.get(row).map_or(true, Option::is_none),
            Column::Text(v) => v.get(row).map_or(true, Option::is_none),
        }
    }

    /// JSON-safe cell value. Nulls and non-finite floats become `Null`;
    /// datetimes become RFC 3339 text.
    pub fn json_value(&self, row: usize) -> Value {
        match self {
            Column::Int(v) => v
                .get(row)
                .copied()
                .flatten()
                .map(Value::from)
                .unwrap_or(Value::Null),
            Column::Float(v) => v
                .get(row)
                .copied()
                .flatten()
                .filter(|f| f.is_finite())
                .map(Value::from)
                .unwrap_or(Value::Null),
            Column::Bool(v) => v
                .get(row)
                .copied()
                .flatten()
                .map(Value::from)
                .unwrap_or(Value::Null),
            Column::Datetime(v) => v
                .get(row)
                .copied()
                .flatten()
                .map(|dt| Value::String(dt.to_rfc3339()))
                .unwrap_or(Value::Null),
            Column::Text(v) => v
                .get(row)
                .and_then(Clone::clone)
                .map(Value::String)
                .unwrap_or(Value::Null),
        }
    }

    /// String form used by full-text search. `None` means the cell does not
    /// take part in matching (null cells never match). Datetimes match their
    /// spaced `YYYY-MM-DD HH:MM:SS` form.
    pub fn search_text(&self, row: usize) -> Option<String> {
        match self {
            Column::Int(v) => v.get(row).copied().flatten().map(|x| x.to_string()),
            Column::Float(v) => v.get(row).copied().flatten().map(|x| x.to_string()),
            Column::Bool(v) => v.get(row).copied().flatten().map(|x| x.to_string()),
            Column::Datetime(v) => v
                .get(row)
                .copied()
                .flatten()
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            Column::Text(v) => v.get(row).and_then(Clone::clone),
        }
    }

    /// Textual cell form for CSV export. Nulls are empty fields.
    pub fn csv_text(&self, row: usize) -> String {
        match self {
            Column::Datetime(v) => v
                .get(row)
                .copied()
                .flatten()
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default(),
            other => match other.json_value(row) {
                Value::Null => String::new(),
                Value::String(s) => s,
                v => v.to_string(),
            },
        }
    }

    /// Compare two non-null cells of this column. Callers are responsible for
    /// null placement; comparing a null cell yields `Equal`.
    pub fn cmp_non_null(&self, a: usize, b: usize) -> Ordering {
        match self {
            Column::Int(v) => opt_cmp(v.get(a), v.get(b)),
            Column::Float(v) => {
                match (v.get(a).copied().flatten(), v.get(b).copied().flatten()) {
                    (Some(x), Some(y)) => x.total_cmp(&y),
                    _ => Ordering::Equal,
                }
            }
            Column::Bool(v) => opt_cmp(v.get(a), v.get(b)),
            Column::Datetime(v) => opt_cmp(v.get(a), v.get(b)),
            Column::Text(v) => opt_cmp(v.get(a), v.get(b)),
        }
    }
}

fn opt_cmp<T: Ord>(a: Option<&Option<T>>, b: Option<&Option<T>>) -> Ordering {
    match (a.and_then(Option::as_ref), b.and_then(Option::as_ref)) {
        (Some(x), Some(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Ordered collection of equally long typed columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    columns: IndexMap<String, Column>,
    row_count: usize,
}

impl Table {
    pub fn new(columns: IndexMap<String, Column>) -> Self {
        let row_count = columns.values().map(Column::len).max().unwrap_or(0);
        debug_assert!(columns.values().all(|c| c.len() == row_count));
        Self { columns, row_count }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&String, &Column)> {
        self.columns.iter()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &String> {
        self.columns.keys()
    }

    /// Column → declared-type map, in column order.
    pub fn column_types(&self) -> IndexMap<String, ColumnType> {
        self.columns
            .iter()
            .map(|(name, col)| (name.clone(), col.column_type()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_table() -> Table {
        let mut columns = IndexMap::new();
        columns.insert(
            "count".to_string(),
            Column::Int(vec![Some(3), None, Some(-1)]),
        );
        columns.insert(
            "ratio".to_string(),
            Column::Float(vec![Some(0.5), Some(2.25), None]),
        );
        columns.insert(
            "name".to_string(),
            Column::Text(vec![
                Some("alpha".to_string()),
                Some("Beta".to_string()),
                None,
            ]),
        );
        columns.insert(
            "seen_at".to_string(),
            Column::Datetime(vec![
                Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
                None,
                Some(Utc.with_ymd_and_hms(2024, 5, 2, 0, 30, 0).unwrap()),
            ]),
        );
        Table::new(columns)
    }

    #[test]
    fn json_values_are_type_faithful() {
        let table = sample_table();
        assert_eq!(table.column("count").unwrap().json_value(0), Value::from(3));
        assert_eq!(table.column("count").unwrap().json_value(1), Value::Null);
        assert_eq!(
            table.column("ratio").unwrap().json_value(1),
            Value::from(2.25)
        );
        assert_eq!(
            table.column("seen_at").unwrap().json_value(0),
            Value::String("2024-05-01T12:00:00+00:00".to_string())
        );
    }

    #[test]
    fn non_finite_floats_serialize_as_null() {
        let col = Column::Float(vec![Some(f64::INFINITY), Some(f64::NAN)]);
        assert_eq!(col.json_value(0), Value::Null);
        assert_eq!(col.json_value(1), Value::Null);
    }

    #[test]
    fn column_types_preserve_order() {
        let table = sample_table();
        let types: Vec<_> = table
            .column_types()
            .into_iter()
            .map(|(name, ty)| (name, ty.as_str()))
            .collect();
        assert_eq!(
            types,
            vec![
                ("count".to_string(), "int"),
                ("ratio".to_string(), "float"),
                ("name".to_string(), "string"),
                ("seen_at".to_string(), "datetime"),
            ]
        );
    }

    #[test]
    fn serde_round_trip_keeps_types() {
        let table = sample_table();
        let bytes = serde_json::to_vec(&table).unwrap();
        let back: Table = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.row_count(), 3);
        assert_eq!(
            back.column("seen_at").unwrap().column_type(),
            ColumnType::Datetime
        );
        assert_eq!(
            back.column("seen_at").unwrap().json_value(0),
            table.column("seen_at").unwrap().json_value(0)
        );
    }

    #[test]
    fn cmp_treats_nulls_as_equal() {
        let col = Column::Int(vec![Some(1), None, Some(2)]);
        assert_eq!(col.cmp_non_null(0, 2), Ordering::Less);
        assert_eq!(col.cmp_non_null(0, 1), Ordering::Equal);
    }
}

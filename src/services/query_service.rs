//! The log-table query engine: search → flag filter → sort → count →
//! paginate → serialize, in that fixed order.
//!
//! The selection core is pure functions over a dataset snapshot and an
//! annotation snapshot; the service wrapper only adds store access.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{AppError, AppResult};
use crate::flags::{FlagEntry, FlagFilter};
use crate::store::{AnnotationStore, DatasetStore};
use crate::table::{ColumnType, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(AppError::validation(format!(
                "sort_direction must be asc or desc, got {other:?}"
            ))),
        }
    }
}

/// Search/filter/sort parameters, shared by the query and export paths.
#[derive(Debug, Clone, Default)]
pub struct RowSelection {
    pub search: Option<String>,
    pub flag_filter: Vec<FlagFilter>,
    pub sort_column: Option<String>,
    pub sort_direction: SortDirection,
}

#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

/// One serialized page row. `id` is the stable row index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRow {
    pub id: usize,
    pub project_id: i32,
    pub data: IndexMap<String, Value>,
    pub flag: String,
    pub memo: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPage {
    pub logs: Vec<LogRow>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub column_types: IndexMap<String, ColumnType>,
}

/// Apply search, flag filter, and sort; returns surviving row indices.
///
/// With no sort column the filtered order is the ingestion order (row index
/// ascending), which keeps results deterministic.
pub fn select_rows(
    table: &Table,
    flags: &HashMap<usize, FlagEntry>,
    selection: &RowSelection,
) -> Vec<usize> {
    let mut rows: Vec<usize> = (0..table.row_count()).collect();

    if let Some(search) = selection
        .search
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        let needle = search.to_lowercase();
        rows.retain(|&row| row_matches_search(table, row, &needle));
    }

    if !selection.flag_filter.is_empty() {
        rows.retain(|&row| {
            let flag = flags.get(&row).and_then(|entry| entry.flag);
            selection
                .flag_filter
                .iter()
                .any(|filter| filter.matches(flag))
        });
    }

    if let Some(sort_column) = selection.sort_column.as_deref() {
        sort_rows(table, &mut rows, sort_column, selection.sort_direction);
    }

    rows
}

/// Case-insensitive substring match against every column's string form.
/// Cells with no string form (nulls) are skipped silently.
fn row_matches_search(table: &Table, row: usize, needle: &str) -> bool {
    table.columns().any(|(_, column)| {
        column
            .search_text(row)
            .map(|text| text.to_lowercase().contains(needle))
            .unwrap_or(false)
    })
}

/// Stable sort by one column. The client-facing identifier `id` sorts by row
/// index; an unknown column name leaves the order untouched. Nulls go last
/// regardless of direction.
fn sort_rows(table: &Table, rows: &mut Vec<usize>, sort_column: &str, direction: SortDirection) {
    if sort_column == "id" {
        rows.sort_unstable();
        if direction == SortDirection::Desc {
            rows.reverse();
        }
        return;
    }
    let Some(column) = table.column(sort_column) else {
        return;
    };
    rows.sort_by(|&a, &b| match (column.is_null(a), column.is_null(b)) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ord = column.cmp_non_null(a, b);
            match direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        }
    });
}

/// Serialize one row to its JSON-safe page representation.
pub fn serialize_row(
    table: &Table,
    flags: &HashMap<usize, FlagEntry>,
    project_id: i32,
    row: usize,
) -> LogRow {
    let data: IndexMap<String, Value> = table
        .columns()
        .map(|(name, column)| (name.clone(), column.json_value(row)))
        .collect();
    let entry = flags.get(&row);
    LogRow {
        id: row,
        project_id,
        data,
        flag: entry.map(|e| e.flag_token()).unwrap_or("").to_string(),
        memo: entry.map(|e| e.memo.clone()).unwrap_or_default(),
    }
}

pub struct QueryService {
    datasets: Arc<DatasetStore>,
    annotations: AnnotationStore,
}

impl QueryService {
    pub fn new(datasets: Arc<DatasetStore>, annotations: AnnotationStore) -> Self {
        Self {
            datasets,
            annotations,
        }
    }

    pub async fn logs(
        &self,
        project_id: i32,
        selection: &RowSelection,
        page: PageRequest,
    ) -> AppResult<LogPage> {
        if page.limit == 0 {
            return Err(AppError::validation("limit must be greater than zero"));
        }
        let table = self.datasets.load(project_id).await?;
        let flags = self.annotations.by_project(project_id).await?;

        let rows = select_rows(&table, &flags, selection);
        let total = rows.len();

        let logs: Vec<LogRow> = rows
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .map(|row| serialize_row(&table, &flags, project_id, row))
            .collect();

        Ok(LogPage {
            logs,
            total,
            offset: page.offset,
            limit: page.limit,
            column_types: table.column_types(),
        })
    }
}

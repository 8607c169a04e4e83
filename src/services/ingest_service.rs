//! CSV ingestion: parse, extract embedded annotations, strip the
//! hidden-column marker, infer column types, persist.
//!
//! The project record is created first so its id can name the dataset file;
//! every later failure rolls the project and any written file back, making
//! ingestion all-or-nothing for the caller.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde::Serialize;
use tracing::{info, warn};

use crate::database::entities::projects;
use crate::errors::{AppError, AppResult};
use crate::flags::{
    Flag, FlagEntry, COL_FLAG_NG, COL_FLAG_OK, COL_FLAG_QUESTION, COL_ID, COL_MEMO, HIDDEN_MARKER,
};
use crate::store::{AnnotationStore, DatasetStore};
use crate::table::infer::{build_column, InferOptions};
use crate::table::Table;

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub project_id: i32,
    pub records_uploaded: usize,
    pub hidden_columns: Vec<String>,
}

pub struct IngestService {
    db: DatabaseConnection,
    datasets: Arc<DatasetStore>,
    annotations: AnnotationStore,
    options: InferOptions,
}

impl IngestService {
    pub fn new(db: DatabaseConnection, datasets: Arc<DatasetStore>) -> Self {
        let annotations = AnnotationStore::new(db.clone());
        Self {
            db,
            datasets,
            annotations,
            options: InferOptions::default(),
        }
    }

    pub fn with_options(mut self, options: InferOptions) -> Self {
        self.options = options;
        self
    }

    /// Ingest an uploaded CSV. `file_name` doubles as the project name.
    pub async fn ingest(
        &self,
        file_name: &str,
        description: Option<String>,
        bytes: &[u8],
    ) -> AppResult<IngestReport> {
        if file_name.is_empty() {
            return Err(AppError::validation("no file provided"));
        }
        if !file_name.to_lowercase().ends_with(".csv") {
            return Err(AppError::validation(
                "invalid file type, please upload a CSV",
            ));
        }

        // Created first: the project id names the dataset file.
        let project = projects::ActiveModel {
            name: Set(file_name.to_string()),
            description: Set(description),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        match self.ingest_inner(project.id, bytes).await {
            Ok((records_uploaded, hidden_columns)) => {
                info!(
                    project_id = project.id,
                    records = records_uploaded,
                    "csv ingested"
                );
                Ok(IngestReport {
                    project_id: project.id,
                    records_uploaded,
                    hidden_columns,
                })
            }
            Err(err) => {
                warn!(project_id = project.id, error = %err, "ingestion failed, rolling back");
                self.rollback(project.id).await;
                Err(AppError::Ingestion(err.to_string()))
            }
        }
    }

    async fn rollback(&self, project_id: i32) {
        if let Err(err) = self.annotations.delete_by_project(project_id).await {
            warn!(project_id, error = %err, "rollback: annotation cleanup failed");
        }
        if let Err(err) = self.datasets.remove(project_id).await {
            warn!(project_id, error = %err, "rollback: dataset cleanup failed");
        }
        if let Err(err) = projects::Entity::delete_by_id(project_id)
            .exec(&self.db)
            .await
        {
            warn!(project_id, error = %err, "rollback: project cleanup failed");
        }
    }

    async fn ingest_inner(
        &self,
        project_id: i32,
        bytes: &[u8],
    ) -> AppResult<(usize, Vec<String>)> {
        let parsed = parse_csv(bytes)?;
        let row_count = parsed.row_count;

        let (annotations, reserved) = extract_annotations(&parsed);

        let mut hidden_columns = Vec::new();
        let mut columns = IndexMap::new();
        for (idx, header) in parsed.headers.iter().enumerate() {
            if reserved.contains(&idx) {
                continue;
            }
            let name = match header.strip_prefix(HIDDEN_MARKER) {
                Some(stripped) => {
                    hidden_columns.push(stripped.to_string());
                    stripped.to_string()
                }
                None => header.clone(),
            };
            columns.insert(name.clone(), build_column(&name, &parsed.cells[idx], &self.options));
        }

        self.datasets
            .save(project_id, Table::new(columns))
            .await?;
        self.annotations.bulk_insert(project_id, &annotations).await?;

        Ok((row_count, hidden_columns))
    }
}

struct ParsedCsv {
    headers: Vec<String>,
    /// Column-major cells; empty fields are `None`.
    cells: Vec<Vec<Option<String>>>,
    row_count: usize,
}

fn parse_csv(bytes: &[u8]) -> AppResult<ParsedCsv> {
    let mut reader = csv::Reader::from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| AppError::validation(format!("invalid CSV header: {err}")))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    let mut row_count = 0usize;
    for record in reader.records() {
        let record =
            record.map_err(|err| AppError::validation(format!("invalid CSV record: {err}")))?;
        for (idx, column) in cells.iter_mut().enumerate() {
            let value = record.get(idx).unwrap_or("");
            column.push(if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            });
        }
        row_count += 1;
    }

    Ok(ParsedCsv {
        headers,
        cells,
        row_count,
    })
}

/// Pull the reserved annotation columns out of the parsed file. Returns the
/// sparse annotation set plus the header indices to drop. A non-empty cell in
/// a flag column sets that flag (ok wins over question wins over not-good
/// when a malformed file sets several); `trivium-id` values are ignored and
/// row identity is always reassigned.
fn extract_annotations(
    parsed: &ParsedCsv,
) -> (BTreeMap<usize, FlagEntry>, HashSet<usize>) {
    let mut annotations: BTreeMap<usize, FlagEntry> = BTreeMap::new();
    let mut reserved = HashSet::new();

    for (idx, header) in parsed.headers.iter().enumerate() {
        let flag = match header.as_str() {
            COL_FLAG_OK => Flag::Ok,
            COL_FLAG_QUESTION => Flag::Question,
            COL_FLAG_NG => Flag::NotGood,
            COL_MEMO => {
                reserved.insert(idx);
                for (row, cell) in parsed.cells[idx].iter().enumerate() {
                    if let Some(memo) = cell {
                        annotations.entry(row).or_default().memo = memo.clone();
                    }
                }
                continue;
            }
            COL_ID => {
                reserved.insert(idx);
                continue;
            }
            _ => continue,
        };

        reserved.insert(idx);
        for (row, cell) in parsed.cells[idx].iter().enumerate() {
            if cell.is_some() {
                let entry = annotations.entry(row).or_default();
                if entry.flag.is_none() {
                    entry.flag = Some(flag);
                }
            }
        }
    }

    (annotations, reserved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(csv_text: &str) -> ParsedCsv {
        parse_csv(csv_text.as_bytes()).unwrap()
    }

    #[test]
    fn parse_csv_is_column_major_with_null_empties() {
        let parsed = parsed("a,b\n1,\n2,x\n");
        assert_eq!(parsed.row_count, 2);
        assert_eq!(parsed.headers, vec!["a", "b"]);
        assert_eq!(parsed.cells[1], vec![None, Some("x".to_string())]);
    }

    #[test]
    fn reserved_columns_become_annotations() {
        let parsed = parsed(
            "trivium-id,name,trivium-flag-ok,trivium-memo\n0,alpha,1,fine\n1,beta,,\n2,gamma,,later\n",
        );
        let (annotations, reserved) = extract_annotations(&parsed);
        assert_eq!(reserved.len(), 3);
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations[&0].flag, Some(Flag::Ok));
        assert_eq!(annotations[&0].memo, "fine");
        assert_eq!(annotations[&2].flag, None);
        assert_eq!(annotations[&2].memo, "later");
    }

    #[test]
    fn first_flag_column_wins_on_conflict() {
        let parsed = parsed("trivium-flag-ok,trivium-flag-ng\n1,1\n");
        let (annotations, _) = extract_annotations(&parsed);
        assert_eq!(annotations[&0].flag, Some(Flag::Ok));
    }

    #[test]
    fn only_exact_reserved_names_are_extracted() {
        // A column that merely resembles the reserved names stays user data.
        let parsed = parsed("trivium-future,name\nx,alpha\n");
        let (annotations, reserved) = extract_annotations(&parsed);
        assert!(annotations.is_empty());
        assert!(reserved.is_empty());
    }

    #[test]
    fn ragged_records_are_validation_errors() {
        assert!(parse_csv(b"a,b\n1\n").is_err());
    }
}

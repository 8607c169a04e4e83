//! CSV export: the inverse of ingestion. Re-applies the query engine's
//! search/filter/sort (never pagination), re-embeds the current annotations
//! as the leading reserved columns, and restores the hidden-column marker.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, EntityTrait};

use crate::database::entities::projects;
use crate::errors::{AppError, AppResult};
use crate::flags::{
    Flag, COL_FLAG_NG, COL_FLAG_OK, COL_FLAG_QUESTION, COL_ID, COL_MEMO, HIDDEN_MARKER,
};
use crate::services::query_service::{select_rows, RowSelection};
use crate::store::{AnnotationStore, DatasetStore};

#[derive(Debug, Clone)]
pub struct CsvExport {
    pub filename: String,
    pub content: String,
}

pub struct ExportService {
    db: DatabaseConnection,
    datasets: Arc<DatasetStore>,
    annotations: AnnotationStore,
}

impl ExportService {
    pub fn new(db: DatabaseConnection, datasets: Arc<DatasetStore>) -> Self {
        let annotations = AnnotationStore::new(db.clone());
        Self {
            db,
            datasets,
            annotations,
        }
    }

    pub async fn export_csv(
        &self,
        project_id: i32,
        selection: &RowSelection,
        hidden_columns: &[String],
    ) -> AppResult<CsvExport> {
        let project = projects::Entity::find_by_id(project_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found(format!("project {} not found", project_id)))?;

        let table = self.datasets.load(project_id).await?;
        let flags = self.annotations.by_project(project_id).await?;
        let rows = select_rows(&table, &flags, selection);

        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header: Vec<String> = vec![
            COL_ID.to_string(),
            COL_FLAG_OK.to_string(),
            COL_FLAG_QUESTION.to_string(),
            COL_FLAG_NG.to_string(),
            COL_MEMO.to_string(),
        ];
        for name in table.column_names() {
            if hidden_columns.contains(name) {
                header.push(format!("{}{}", HIDDEN_MARKER, name));
            } else {
                header.push(name.clone());
            }
        }
        writer.write_record(&header)?;

        for row in rows {
            let entry = flags.get(&row);
            let flag = entry.and_then(|e| e.flag);
            let mut record: Vec<String> = vec![
                row.to_string(),
                indicator(flag == Some(Flag::Ok)),
                indicator(flag == Some(Flag::Question)),
                indicator(flag == Some(Flag::NotGood)),
                entry.map(|e| e.memo.clone()).unwrap_or_default(),
            ];
            for (_, column) in table.columns() {
                record.push(column.csv_text(row));
            }
            writer.write_record(&record)?;
        }

        let bytes = writer.into_inner().map_err(|err| {
            AppError::Io(std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
        })?;
        let content = String::from_utf8(bytes).map_err(|err| {
            AppError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
        })?;

        Ok(CsvExport {
            filename: export_filename(&project.name, Utc::now()),
            content,
        })
    }
}

fn indicator(set: bool) -> String {
    if set {
        "1".to_string()
    } else {
        String::new()
    }
}

/// `{timestamp}_{project name without its .csv suffix}.csv`
fn export_filename(project_name: &str, now: DateTime<Utc>) -> String {
    let base = project_name
        .strip_suffix(".csv")
        .unwrap_or(project_name);
    format!("{}_{}.csv", now.format("%Y%m%d_%H%M%S"), base)
}

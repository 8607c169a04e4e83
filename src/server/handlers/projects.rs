use axum::extract::{Multipart, Path, State};
use axum::response::Json;
use serde_json::{json, Value};

use crate::errors::{AppError, AppResult};
use crate::server::app::AppState;
use crate::services::{IngestService, ProjectService, ProjectSummary};

pub async fn list_projects(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ProjectSummary>>> {
    let service = ProjectService::new(state.db.clone(), state.datasets.clone());
    Ok(Json(service.list().await?))
}

/// Multipart upload: `file` (the CSV, whose filename becomes the project
/// name) plus an optional `description` text field.
pub async fn create_project(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    let mut file_name: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut description: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::validation(format!("invalid multipart body: {err}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "file" => {
                file_name = field.file_name().map(|name| name.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::validation(format!("failed to read upload: {err}")))?;
                file_bytes = Some(bytes.to_vec());
            }
            "description" => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| AppError::validation(format!("failed to read upload: {err}")))?;
                if !text.is_empty() {
                    description = Some(text);
                }
            }
            _ => {}
        }
    }

    let bytes = file_bytes.ok_or_else(|| AppError::validation("no file provided"))?;
    let file_name = file_name.unwrap_or_default();

    let service = IngestService::new(state.db.clone(), state.datasets.clone());
    let report = service.ingest(&file_name, description, &bytes).await?;

    Ok(Json(json!({
        "status": "success",
        "project_id": report.project_id,
        "records_uploaded": report.records_uploaded,
        "hidden_columns": report.hidden_columns,
    })))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Value>> {
    let service = ProjectService::new(state.db.clone(), state.datasets.clone());
    service.delete(id).await?;
    Ok(Json(json!({
        "status": "success",
        "deleted_project_id": id,
    })))
}

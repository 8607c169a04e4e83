//! Project listing, lookup, and cascading deletion.

use std::sync::Arc;

use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder};
use serde::Serialize;
use tracing::info;

use crate::database::entities::projects;
use crate::errors::{AppError, AppResult};
use crate::store::{AnnotationStore, DatasetStore};

/// Project record enriched with derived counts for the listing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub total_records: usize,
    pub flagged_records: u64,
}

pub struct ProjectService {
    db: DatabaseConnection,
    datasets: Arc<DatasetStore>,
    annotations: AnnotationStore,
}

impl ProjectService {
    pub fn new(db: DatabaseConnection, datasets: Arc<DatasetStore>) -> Self {
        let annotations = AnnotationStore::new(db.clone());
        Self {
            db,
            datasets,
            annotations,
        }
    }

    /// All projects, newest first, with row and flag counts. A project whose
    /// dataset file is missing lists with zero rows rather than failing.
    pub async fn list(&self) -> AppResult<Vec<ProjectSummary>> {
        let models = projects::Entity::find()
            .order_by_desc(projects::Column::CreatedAt)
            .all(&self.db)
            .await?;

        let mut summaries = Vec::with_capacity(models.len());
        for model in models {
            let total_records = match self.datasets.load(model.id).await {
                Ok(table) => table.row_count(),
                Err(_) => 0,
            };
            let flagged_records = self.annotations.flagged_count(model.id).await?;
            summaries.push(ProjectSummary {
                id: model.id,
                name: model.name,
                description: model.description,
                created_at: model.created_at,
                total_records,
                flagged_records,
            });
        }
        Ok(summaries)
    }

    pub async fn get(&self, project_id: i32) -> AppResult<projects::Model> {
        projects::Entity::find_by_id(project_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found(format!("project {} not found", project_id)))
    }

    /// Cascade delete: cache entry and dataset file first, then annotations,
    /// then the project record, so a concurrent reader never sees the record
    /// without its dependents. Idempotent: deleting a missing project is
    /// not an error.
    pub async fn delete(&self, project_id: i32) -> AppResult<()> {
        self.datasets.remove(project_id).await?;
        self.annotations.delete_by_project(project_id).await?;
        projects::Entity::delete_by_id(project_id)
            .exec(&self.db)
            .await?;
        info!(project_id, "project deleted");
        Ok(())
    }
}

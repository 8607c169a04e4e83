//! Annotation store: sparse per-row flag/memo records in SQLite via sea-orm.

use std::collections::{BTreeMap, HashMap};

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, Set,
};

use crate::database::entities::annotations;
use crate::errors::AppResult;
use crate::flags::{Flag, FlagEntry};

#[derive(Clone)]
pub struct AnnotationStore {
    db: DatabaseConnection,
}

impl AnnotationStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Full sparse map for a project: row index → flag/memo.
    pub async fn by_project(&self, project_id: i32) -> AppResult<HashMap<usize, FlagEntry>> {
        let rows = annotations::Entity::find()
            .filter(annotations::Column::ProjectId.eq(project_id))
            .all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.row_index as usize,
                    FlagEntry {
                        flag: Flag::from_indicators(row.flag_ok, row.flag_question, row.flag_ng),
                        memo: row.memo,
                    },
                )
            })
            .collect())
    }

    /// Insert-or-update one annotation. A `None` memo leaves any stored memo
    /// untouched; the flag indicators are always replaced. Returns the
    /// effective stored entry.
    pub async fn upsert(
        &self,
        project_id: i32,
        row_index: i32,
        flag: Option<Flag>,
        memo: Option<String>,
    ) -> AppResult<FlagEntry> {
        let (ok, question, ng) = Flag::to_indicators(flag);
        let existing = annotations::Entity::find()
            .filter(annotations::Column::ProjectId.eq(project_id))
            .filter(annotations::Column::RowIndex.eq(row_index))
            .one(&self.db)
            .await?;

        let memo = match existing {
            Some(model) => {
                let effective_memo = memo.unwrap_or_else(|| model.memo.clone());
                let mut active: annotations::ActiveModel = model.into();
                active.flag_ok = Set(ok);
                active.flag_question = Set(question);
                active.flag_ng = Set(ng);
                active.memo = Set(effective_memo.clone());
                active.update(&self.db).await?;
                effective_memo
            }
            None => {
                let effective_memo = memo.unwrap_or_default();
                let active = annotations::ActiveModel {
                    project_id: Set(project_id),
                    row_index: Set(row_index),
                    flag_ok: Set(ok),
                    flag_question: Set(question),
                    flag_ng: Set(ng),
                    memo: Set(effective_memo.clone()),
                    ..Default::default()
                };
                active.insert(&self.db).await?;
                effective_memo
            }
        };

        Ok(FlagEntry { flag, memo })
    }

    /// Bulk-insert annotations extracted at ingestion time. The rows are
    /// keyed by row index and assumed not to exist yet.
    pub async fn bulk_insert(
        &self,
        project_id: i32,
        entries: &BTreeMap<usize, FlagEntry>,
    ) -> AppResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let records: Vec<annotations::ActiveModel> = entries
            .iter()
            .map(|(row_index, entry)| {
                let (ok, question, ng) = Flag::to_indicators(entry.flag);
                annotations::ActiveModel {
                    project_id: Set(project_id),
                    row_index: Set(*row_index as i32),
                    flag_ok: Set(ok),
                    flag_question: Set(question),
                    flag_ng: Set(ng),
                    memo: Set(entry.memo.clone()),
                    ..Default::default()
                }
            })
            .collect();
        annotations::Entity::insert_many(records)
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Cascade target for project deletion.
    pub async fn delete_by_project(&self, project_id: i32) -> AppResult<()> {
        annotations::Entity::delete_many()
            .filter(annotations::Column::ProjectId.eq(project_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Number of rows carrying a real flag (any indicator set).
    pub async fn flagged_count(&self, project_id: i32) -> AppResult<u64> {
        let count = annotations::Entity::find()
            .filter(annotations::Column::ProjectId.eq(project_id))
            .filter(
                Condition::any()
                    .add(annotations::Column::FlagOk.eq(true))
                    .add(annotations::Column::FlagQuestion.eq(true))
                    .add(annotations::Column::FlagNg.eq(true)),
            )
            .count(&self.db)
            .await?;
        Ok(count)
    }
}

use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::{AppError, AppResult};
use crate::flags::{Flag, FlagFilter};
use crate::server::app::AppState;
use crate::services::{
    ExportService, LogPage, PageRequest, ProjectService, QueryService, RowSelection, SortDirection,
};
use crate::store::AnnotationStore;

/// Parsed query-string parameters for the logs and export endpoints.
///
/// `flag_filter` and `hidden_columns` are repeatable, which
/// `axum::extract::Query` cannot collect, so the raw query string is parsed
/// with `form_urlencoded` instead.
struct LogParams {
    selection: RowSelection,
    page: PageRequest,
    hidden_columns: Vec<String>,
}

fn parse_params(raw: Option<&str>) -> AppResult<LogParams> {
    let mut selection = RowSelection::default();
    let mut page = PageRequest {
        offset: 0,
        limit: 100,
    };
    let mut hidden_columns = Vec::new();

    for (key, value) in url::form_urlencoded::parse(raw.unwrap_or("").as_bytes()) {
        match key.as_ref() {
            "offset" => {
                page.offset = value
                    .parse()
                    .map_err(|_| AppError::validation(format!("invalid offset: {value:?}")))?;
            }
            "limit" => {
                page.limit = value
                    .parse()
                    .map_err(|_| AppError::validation(format!("invalid limit: {value:?}")))?;
            }
            "sort_column" => {
                if !value.is_empty() {
                    selection.sort_column = Some(value.into_owned());
                }
            }
            "sort_direction" => {
                selection.sort_direction = SortDirection::parse(&value)?;
            }
            "search" => {
                if !value.trim().is_empty() {
                    selection.search = Some(value.into_owned());
                }
            }
            "flag_filter" => {
                selection.flag_filter.push(FlagFilter::parse(&value)?);
            }
            "hidden_columns" => {
                hidden_columns.push(value.into_owned());
            }
            _ => {}
        }
    }

    Ok(LogParams {
        selection,
        page,
        hidden_columns,
    })
}

pub async fn get_logs(
    State(state): State<AppState>,
    Path(project_id): Path<i32>,
    RawQuery(query): RawQuery,
) -> AppResult<Json<LogPage>> {
    let params = parse_params(query.as_deref())?;
    let service = QueryService::new(
        state.datasets.clone(),
        AnnotationStore::new(state.db.clone()),
    );
    let page = service
        .logs(project_id, &params.selection, params.page)
        .await?;
    Ok(Json(page))
}

pub async fn export_logs(
    State(state): State<AppState>,
    Path(project_id): Path<i32>,
    RawQuery(query): RawQuery,
) -> AppResult<impl IntoResponse> {
    let params = parse_params(query.as_deref())?;
    let service = ExportService::new(state.db.clone(), state.datasets.clone());
    let export = service
        .export_csv(project_id, &params.selection, &params.hidden_columns)
        .await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", export.filename))
            .map_err(|err| AppError::validation(format!("bad export filename: {err}")))?,
    );
    Ok((headers, export.content))
}

#[derive(Deserialize)]
pub struct FlagUpdateRequest {
    pub flag: String,
    #[serde(default)]
    pub memo: Option<String>,
}

/// Upsert one row's flag/memo. An omitted memo preserves the stored memo;
/// the flag is always replaced.
pub async fn update_flag(
    State(state): State<AppState>,
    Path((project_id, row_index)): Path<(i32, i32)>,
    Json(request): Json<FlagUpdateRequest>,
) -> AppResult<Json<Value>> {
    let flag = Flag::from_token(&request.flag)?;

    // Fail with not-found before touching the annotation table.
    ProjectService::new(state.db.clone(), state.datasets.clone())
        .get(project_id)
        .await?;

    let entry = AnnotationStore::new(state.db.clone())
        .upsert(project_id, row_index, flag, request.memo)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "project_id": project_id,
        "row_index": row_index,
        "flag": entry.flag_token(),
        "memo": entry.memo,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_query_is_empty() {
        let params = parse_params(None).unwrap();
        assert_eq!(params.page.offset, 0);
        assert_eq!(params.page.limit, 100);
        assert!(params.selection.search.is_none());
        assert!(params.selection.flag_filter.is_empty());
    }

    #[test]
    fn repeated_flag_filters_accumulate() {
        let params = parse_params(Some(
            "flag_filter=No+Flag&flag_filter=%E2%97%AF&offset=20&limit=10",
        ))
        .unwrap();
        assert_eq!(params.selection.flag_filter.len(), 2);
        assert_eq!(params.page.offset, 20);
        assert_eq!(params.page.limit, 10);
    }

    #[test]
    fn bad_sort_direction_is_a_validation_error() {
        assert!(parse_params(Some("sort_direction=sideways")).is_err());
    }

    #[test]
    fn hidden_columns_collect_in_order() {
        let params =
            parse_params(Some("hidden_columns=secret&hidden_columns=internal")).unwrap();
        assert_eq!(params.hidden_columns, vec!["secret", "internal"]);
    }
}

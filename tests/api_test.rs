//! API integration tests
//!
//! End-to-end coverage of the REST surface: upload, query, flag updates,
//! export, and cascade deletion.

use std::sync::Arc;

use anyhow::Result;
use axum::http::StatusCode;
use axum_test::TestServer;
use sea_orm::{Database, DatabaseConnection};
use serde_json::{json, Value};
use tempfile::{NamedTempFile, TempDir};

use trivium::database::connection::setup_database;
use trivium::server::app::create_app;
use trivium::services::IngestService;
use trivium::store::DatasetStore;

struct TestContext {
    server: TestServer,
    db: DatabaseConnection,
    datasets: Arc<DatasetStore>,
    _db_file: NamedTempFile,
    _data_dir: TempDir,
}

async fn setup() -> Result<TestContext> {
    let db_file = NamedTempFile::new()?;
    let db_url = format!("sqlite://{}?mode=rwc", db_file.path().display());
    let db = Database::connect(&db_url).await?;
    setup_database(&db).await?;

    let data_dir = TempDir::new()?;
    let datasets = Arc::new(DatasetStore::new(data_dir.path())?);

    let app = create_app(db.clone(), datasets.clone(), Some("*")).await?;
    let server = TestServer::new(app)?;

    Ok(TestContext {
        server,
        db,
        datasets,
        _db_file: db_file,
        _data_dir: data_dir,
    })
}

/// Ingest through the service layer; the HTTP multipart plumbing is thin
/// enough that the endpoints get exercised via GET/PUT/DELETE instead.
async fn upload(ctx: &TestContext, name: &str, csv: &str) -> Result<i32> {
    let service = IngestService::new(ctx.db.clone(), ctx.datasets.clone());
    let report = service.ingest(name, None, csv.as_bytes()).await?;
    Ok(report.project_id)
}

#[tokio::test]
async fn test_health_endpoint() -> Result<()> {
    let ctx = setup().await?;

    let response = ctx.server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["service"], "trivium");
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());

    Ok(())
}

#[tokio::test]
async fn test_uploaded_annotations_and_hidden_columns_surface_in_logs() -> Result<()> {
    let ctx = setup().await?;
    let csv = "name,-secret,trivium-flag-ok,trivium-memo\n\
               alpha,s1,1,fine\n\
               beta,s2,,\n\
               gamma,s3,,\n";

    let service = IngestService::new(ctx.db.clone(), ctx.datasets.clone());
    let report = service.ingest("sample.csv", None, csv.as_bytes()).await?;
    assert_eq!(report.records_uploaded, 3);
    assert_eq!(report.hidden_columns, vec!["secret"]);

    let response = ctx
        .server
        .get(&format!("/api/projects/{}/logs", report.project_id))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["total"], 3);
    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs[0]["flag"], "◯");
    assert_eq!(logs[0]["memo"], "fine");
    assert_eq!(logs[1]["flag"], "");
    assert_eq!(logs[2]["flag"], "");
    // The marker is stripped; the column itself still serves data.
    assert_eq!(logs[0]["data"]["secret"], "s1");
    assert_eq!(body["column_types"]["name"], "string");

    Ok(())
}

#[tokio::test]
async fn test_project_listing_carries_counts() -> Result<()> {
    let ctx = setup().await?;
    let id = upload(&ctx, "counts.csv", "v\n1\n2\n3\n").await?;

    ctx.server
        .put(&format!("/api/projects/{}/logs/1", id))
        .json(&json!({"flag": "✗"}))
        .await
        .assert_status_ok();

    let body: Value = ctx.server.get("/api/projects").await.json();
    let projects = body.as_array().unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0]["id"], id);
    assert_eq!(projects[0]["total_records"], 3);
    assert_eq!(projects[0]["flagged_records"], 1);

    Ok(())
}

#[tokio::test]
async fn test_logs_search_filter_sort_paginate() -> Result<()> {
    let ctx = setup().await?;
    let csv = "host,latency\nweb01,3.5\nweb02,1.5\ndb01,9.0\nweb03,0.5\n";
    let id = upload(&ctx, "hosts.csv", csv).await?;

    // Flag two rows so flag filters have something to bite on.
    for (row, flag) in [(0, "◯"), (2, "?")] {
        ctx.server
            .put(&format!("/api/projects/{}/logs/{}", id, row))
            .json(&json!({"flag": flag}))
            .await
            .assert_status_ok();
    }

    // Search is case-insensitive substring.
    let body: Value = ctx
        .server
        .get(&format!("/api/projects/{}/logs", id))
        .add_query_param("search", "WEB")
        .await
        .json();
    assert_eq!(body["total"], 3);

    // Flag filters OR-combine.
    let body: Value = ctx
        .server
        .get(&format!("/api/projects/{}/logs", id))
        .add_query_param("flag_filter", "◯")
        .add_query_param("flag_filter", "?")
        .await
        .json();
    assert_eq!(body["total"], 2);

    let body: Value = ctx
        .server
        .get(&format!("/api/projects/{}/logs", id))
        .add_query_param("flag_filter", "No Flag")
        .await
        .json();
    assert_eq!(body["total"], 2);

    // Sort descending by latency, paginate one row at a time.
    let mut seen = Vec::new();
    for offset in 0..4 {
        let body: Value = ctx
            .server
            .get(&format!("/api/projects/{}/logs", id))
            .add_query_param("sort_column", "latency")
            .add_query_param("sort_direction", "desc")
            .add_query_param("offset", offset)
            .add_query_param("limit", 1)
            .await
            .json();
        assert_eq!(body["total"], 4);
        seen.push(body["logs"][0]["data"]["latency"].as_f64().unwrap());
    }
    assert_eq!(seen, vec![9.0, 3.5, 1.5, 0.5]);

    // Offset past the end is an empty page, not an error.
    let body: Value = ctx
        .server
        .get(&format!("/api/projects/{}/logs", id))
        .add_query_param("offset", 100)
        .await
        .json();
    assert_eq!(body["logs"].as_array().unwrap().len(), 0);
    assert_eq!(body["total"], 4);

    Ok(())
}

#[tokio::test]
async fn test_put_without_memo_preserves_stored_memo() -> Result<()> {
    let ctx = setup().await?;
    let id = upload(&ctx, "memo.csv", "v\n1\n2\n").await?;

    ctx.server
        .put(&format!("/api/projects/{}/logs/0", id))
        .json(&json!({"flag": "◯", "memo": "foo"}))
        .await
        .assert_status_ok();

    let response = ctx
        .server
        .put(&format!("/api/projects/{}/logs/0", id))
        .json(&json!({"flag": "?"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["flag"], "?");
    assert_eq!(body["memo"], "foo");

    let body: Value = ctx
        .server
        .get(&format!("/api/projects/{}/logs", id))
        .await
        .json();
    assert_eq!(body["logs"][0]["flag"], "?");
    assert_eq!(body["logs"][0]["memo"], "foo");

    Ok(())
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() -> Result<()> {
    let ctx = setup().await?;
    let id = upload(&ctx, "bad.csv", "v\n1\n").await?;

    let response = ctx
        .server
        .put(&format!("/api/projects/{}/logs/0", id))
        .json(&json!({"flag": "banana"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = ctx
        .server
        .get(&format!("/api/projects/{}/logs", id))
        .add_query_param("limit", 0)
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = ctx
        .server
        .get(&format!("/api/projects/{}/logs", id))
        .add_query_param("sort_direction", "sideways")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_put_on_unknown_project_is_not_found() -> Result<()> {
    let ctx = setup().await?;

    let response = ctx
        .server
        .put("/api/projects/999/logs/0")
        .json(&json!({"flag": "◯"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_export_applies_filters_and_names_the_file() -> Result<()> {
    let ctx = setup().await?;
    let id = upload(&ctx, "audit.csv", "host,level\nweb01,info\nweb02,error\n").await?;

    ctx.server
        .put(&format!("/api/projects/{}/logs/1", id))
        .json(&json!({"flag": "✗", "memo": "broken"}))
        .await
        .assert_status_ok();

    let response = ctx
        .server
        .get(&format!("/api/projects/{}/logs/export", id))
        .add_query_param("flag_filter", "✗")
        .add_query_param("hidden_columns", "level")
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let disposition = response
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()?
        .to_string();
    assert!(disposition.contains("attachment"));
    assert!(disposition.ends_with("_audit.csv\""));

    let body = response.text();
    let mut lines = body.lines();
    assert_eq!(
        lines.next().unwrap(),
        "trivium-id,trivium-flag-ok,trivium-flag-question,trivium-flag-ng,trivium-memo,host,-level"
    );
    assert_eq!(lines.next().unwrap(), "1,,,1,broken,web02,error");
    assert_eq!(lines.next(), None);

    Ok(())
}

#[tokio::test]
async fn test_delete_cascades_and_is_idempotent() -> Result<()> {
    let ctx = setup().await?;
    let id = upload(&ctx, "gone.csv", "v\n1\n").await?;

    ctx.server
        .put(&format!("/api/projects/{}/logs/0", id))
        .json(&json!({"flag": "◯"}))
        .await
        .assert_status_ok();

    let response = ctx.server.delete(&format!("/api/projects/{}", id)).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = ctx.server.get(&format!("/api/projects/{}/logs", id)).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let body: Value = ctx.server.get("/api/projects").await.json();
    assert_eq!(body.as_array().unwrap().len(), 0);

    // Deleting again is not an error.
    let response = ctx.server.delete(&format!("/api/projects/{}", id)).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_non_csv_upload_is_rejected_without_a_project() -> Result<()> {
    let ctx = setup().await?;
    let service = IngestService::new(ctx.db.clone(), ctx.datasets.clone());

    let err = service
        .ingest("notes.txt", None, b"hello")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("CSV"));

    let body: Value = ctx.server.get("/api/projects").await.json();
    assert_eq!(body.as_array().unwrap().len(), 0);

    Ok(())
}

#[tokio::test]
async fn test_malformed_csv_rolls_back_the_project() -> Result<()> {
    let ctx = setup().await?;
    let service = IngestService::new(ctx.db.clone(), ctx.datasets.clone());

    // Second record has the wrong field count.
    let err = service
        .ingest("ragged.csv", None, b"a,b\n1,2\n3\n")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ingestion failed"));

    let body: Value = ctx.server.get("/api/projects").await.json();
    assert_eq!(body.as_array().unwrap().len(), 0);

    Ok(())
}

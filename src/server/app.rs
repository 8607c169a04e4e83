use std::sync::Arc;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sea_orm::DatabaseConnection;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use super::handlers::{health, logs, projects};
use crate::store::DatasetStore;

/// Uploads are whole CSV files; allow well past the axum default.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub datasets: Arc<DatasetStore>,
}

pub async fn create_app(
    db: DatabaseConnection,
    datasets: Arc<DatasetStore>,
    cors_origin: Option<&str>,
) -> Result<Router> {
    let state = AppState { db, datasets };

    let cors = match cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<axum::http::HeaderValue>()?)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api_routes())
        .layer(ServiceBuilder::new().layer(cors))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state);

    Ok(app)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/projects", get(projects::list_projects))
        .route("/projects", post(projects::create_project))
        .route("/projects/:id", delete(projects::delete_project))
        .route("/projects/:id/logs", get(logs::get_logs))
        .route("/projects/:id/logs/export", get(logs::export_logs))
        .route("/projects/:id/logs/:row_index", put(logs::update_flag))
}

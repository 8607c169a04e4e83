//! Error taxonomy shared across services and the HTTP surface.
//!
//! Four caller-visible categories: validation, not-found, ingestion failure
//! (after rollback), and store failure. Each maps to a stable HTTP status and
//! a JSON body carrying the category name plus the underlying message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Bad input: wrong file type, malformed parameters. No mutation happened.
    #[error("{0}")]
    Validation(String),

    /// Unknown project, or a project whose dataset file is gone.
    #[error("{0}")]
    NotFound(String),

    /// CSV ingestion failed after the project row was created; the partial
    /// project and dataset file have already been rolled back.
    #[error("ingestion failed: {0}")]
    Ingestion(String),

    /// Annotation/project store failure.
    #[error("database error: {0}")]
    Store(#[from] sea_orm::DbErr),

    /// Dataset file I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Dataset file (de)serialization failure.
    #[error("dataset serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// CSV encoding failure on the export path.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Ingestion(_) => "ingestion",
            Self::Store(_) => "store",
            Self::Io(_) => "io",
            Self::Serde(_) => "store",
            Self::Csv(_) => "io",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Ingestion(_) | Self::Store(_) | Self::Io(_) | Self::Serde(_) | Self::Csv(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.category(),
            "message": self.to_string(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_category() {
        assert_eq!(
            AppError::validation("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::not_found("gone").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Ingestion("parse".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn message_keeps_underlying_cause() {
        let err = AppError::Ingestion("row 3: wrong field count".into());
        assert!(err.to_string().contains("row 3"));
    }
}

use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Keyword not found: {0}")]
    NotFound(String),

    #[error("Seed keyword '{0}' cannot be removed")]
    SeedProtected(String),

    #[error("Unsupported period: {0} days (expected 7, 14, 30, 60 or 90)")]
    InvalidPeriod(i64),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Collector error: {0}")]
    Collector(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SeedProtected(_) => StatusCode::FORBIDDEN,
            AppError::InvalidPeriod(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

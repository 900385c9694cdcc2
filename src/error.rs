use std::fmt::Display;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Step of the recommendation pipeline an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    RecentlyViewed,
    Embedding,
    VectorQuery,
    Catalogue,
    Generation,
    Normalization,
    Synchronization,
}

impl Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineStage::RecentlyViewed => "recently viewed fetch",
            PipelineStage::Embedding => "embedding",
            PipelineStage::VectorQuery => "vector query",
            PipelineStage::Catalogue => "catalogue fetch",
            PipelineStage::Generation => "generation",
            PipelineStage::Normalization => "normalization",
            PipelineStage::Synchronization => "vector synchronization",
        };
        f.write_str(name)
    }
}

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("{stage} failed: {source}")]
    Stage {
        stage: PipelineStage,
        #[source]
        source: Box<AppError>,
    },
}

impl AppError {
    /// Status code for the innermost error, so stage wrapping never changes it
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Stage { source, .. } => source.status_code(),
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::ExternalApi(_) | AppError::HttpClient(_) | AppError::MalformedOutput(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Database(_) | AppError::Cache(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The stage this error was raised in, if it was wrapped by the pipeline
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            AppError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Tags an error with the pipeline stage it came from
pub trait StageContext<T> {
    fn stage(self, stage: PipelineStage) -> AppResult<T>;
}

impl<T> StageContext<T> for AppResult<T> {
    fn stage(self, stage: PipelineStage) -> AppResult<T> {
        self.map_err(|e| AppError::Stage {
            stage,
            source: Box::new(e),
        })
    }
}

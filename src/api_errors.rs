use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::errors::SentimentError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("{0}")]
    BadGateway(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self::Unprocessable(msg.into())
    }

    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            AppError::BadRequest(s) => (StatusCode::BAD_REQUEST, "bad request", s),
            AppError::NotFound(s) => (StatusCode::NOT_FOUND, "not found", s),
            AppError::Unprocessable(s) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation error", s)
            }
            AppError::BadGateway(s) => (StatusCode::BAD_GATEWAY, "bad gateway", s),
            AppError::Internal(s) => (StatusCode::INTERNAL_SERVER_ERROR, "internal error", s),
        }
    }
}

#[derive(Serialize)]
struct ErrBody<'a> {
    error: &'a str,
    detail: &'a str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, error, detail) = self.parts();
        (code, Json(ErrBody { error, detail })).into_response()
    }
}

impl From<SentimentError> for AppError {
    fn from(err: SentimentError) -> Self {
        match err {
            SentimentError::EmptyInput => AppError::BadRequest("No comments provided.".into()),
            SentimentError::Validation { field, message } => {
                AppError::BadRequest(format!("Validation error for {field}: {message}"))
            }
            SentimentError::ArtifactNotFound { id } => {
                AppError::NotFound(format!("No model artifact for '{id}'"))
            }
            SentimentError::DataSource {
                source_name,
                message,
            } => AppError::BadGateway(format!("{source_name}: {message}")),
            other => AppError::Internal(other.to_string()),
        }
    }
}

//! HTTP-facing error type translating core errors into the `{errors: [...]}`
//! response shape §6/§7 of the contract define.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pipeline::PipelineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("order not found")]
    OrderNotFound,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, errors) = match &self {
            AppError::MissingHeader(_) | AppError::InvalidBody(_) => {
                (StatusCode::BAD_REQUEST, vec![self.to_string()])
            }
            AppError::Pipeline(err) => (StatusCode::BAD_REQUEST, err.messages()),
            AppError::OrderNotFound => (StatusCode::NOT_FOUND, vec![self.to_string()]),
        };

        (status, Json(serde_json::json!({ "errors": errors }))).into_response()
    }
}

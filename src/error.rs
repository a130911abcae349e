use crate::cache::FilterParseError;
use crate::compile::CompileError;
use crate::datasource::LegSourceError;
use crate::orchestration::SessionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Leg source error: {0}")]
    Upstream(String),
}

impl From<LegSourceError> for AppError {
    fn from(err: LegSourceError) -> Self {
        AppError::Upstream(err.to_string())
    }
}

impl From<CompileError> for AppError {
    fn from(err: CompileError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Source(e) => e.into(),
            SessionError::Compile(e) => e.into(),
        }
    }
}

impl From<FilterParseError> for AppError {
    fn from(err: FilterParseError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

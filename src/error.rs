use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

use crate::models::ErrorResponse;

/// Failure of a single call against Drive, Sheets or the userinfo endpoint.
///
/// `status` is `None` when the request never produced a response
/// (connection refused, TLS failure, timeout, undecodable body).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}", describe(.status, .message))]
pub struct ApiError {
    pub status: Option<u16>,
    pub message: String,
}

fn describe(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("HTTP {}: {}", code, message),
        None => format!("transport error: {}", message),
    }
}

impl ApiError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Local precondition failures, checked before a batch contacts any service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no file selected")]
    NoFiles,
    #[error("no destination spreadsheet chosen")]
    NoSpreadsheet,
    #[error("no destination tab chosen")]
    NoTab,
    #[error("lookup name {0:?} not found in the source tab")]
    UnknownLookupName(String),
    #[error("invalid request: {0}")]
    Malformed(String),
}

/// Everything an HTTP handler can fail with.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("missing or malformed bearer token")]
    Auth,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("preference store: {0}")]
    Preferences(#[from] PreferenceError),
    #[error("file too large: {size_mb:.2}MB. Maximum file size is {max_mb}MB.")]
    TooLarge { size_mb: f64, max_mb: u64 },
}

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Api(_) => StatusCode::BAD_GATEWAY,
            AppError::Preferences(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use crate::importer::ImportError;
use crate::trainees::StoreError;

/// Error returned by every handler and extractor. Renders as
/// `{"msg": "..."}` with a matching status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Import(ImportError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound("User not found".into()),
            StoreError::Duplicate(field) => {
                ApiError::BadRequest(format!("This {field} is already registered."))
            }
            StoreError::Backend(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::Store(store) => store.into(),
            ImportError::Internal(msg) => ApiError::Internal(msg),
            ImportError::PayloadTooLarge { .. } => ApiError::PayloadTooLarge(e.to_string()),
            other => ApiError::Import(other),
        }
    }
}

fn msg(m: impl Into<String>) -> Value {
    json!({ "msg": m.into() })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, msg(m)),
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, msg(m)),
            ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, msg(m)),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, msg(m)),
            ApiError::PayloadTooLarge(m) => (StatusCode::PAYLOAD_TOO_LARGE, msg(m)),
            ApiError::Import(e) => (StatusCode::BAD_REQUEST, import_body(e)),
            ApiError::Internal(detail) => {
                error!(error = %detail, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg("Server error"))
            }
        };
        (status, Json(body)).into_response()
    }
}

fn import_body(e: ImportError) -> Value {
    let text = e.to_string();
    match e {
        ImportError::MissingColumns(missing) => json!({ "msg": text, "missing": missing }),
        ImportError::NoValidRows(report) => {
            let mut body = serde_json::to_value(&report).unwrap_or_else(|_| json!({}));
            body["msg"] = Value::String(text);
            body
        }
        _ => msg(text),
    }
}

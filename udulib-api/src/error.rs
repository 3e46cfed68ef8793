//! Error types for udulib-api
//!
//! Every handler returns [`ApiResult`]; failures render as
//! `{"detail": "...", "code": "..."}` with the matching status code.

use axum::{
    async_trait,
    extract::{multipart::MultipartError, rejection::JsonRejection, rejection::QueryRejection, FromRequest, FromRequestParts, Request},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::preview::PreviewError;
use crate::storage::StorageError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("{0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401)
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (403)
    #[error("{0}")]
    Forbidden(String),

    /// Resource not found (404)
    #[error("{0}")]
    NotFound(String),

    /// Conflict (409)
    #[error("{0}")]
    Conflict(String),

    /// Request body over the upload limit (413)
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Optional integration not configured (503)
    #[error("{0}")]
    ServiceUnavailable(String),

    /// Internal server error (500)
    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Common(#[from] udulib_common::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Preview(#[from] PreviewError),

    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{} not found", what))
    }

    pub fn forbidden() -> Self {
        ApiError::Forbidden("Not enough permissions".to_string())
    }

    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg),
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
            ApiError::Database(err) => database_parts(err),
            ApiError::Common(err) => common_parts(err),
            ApiError::Storage(err) => storage_parts(err),
            ApiError::Preview(err) => preview_parts(err),
            ApiError::Multipart(err) => (err.status(), "BAD_REQUEST", err.body_text()),
            ApiError::Other(err) => {
                error!("Unhandled error: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", err.to_string())
            }
        }
    }
}

fn database_parts(err: sqlx::Error) -> (StatusCode, &'static str, String) {
    match &err {
        sqlx::Error::RowNotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", "Resource not found".to_string()),
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => (
            StatusCode::BAD_REQUEST,
            "ALREADY_EXISTS",
            format!("Already exists: {}", db_err.message()),
        ),
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => (
            StatusCode::BAD_REQUEST,
            "REFERENCED",
            "Operation violates a reference between records".to_string(),
        ),
        _ => {
            error!("Database error: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", "Database error".to_string())
        }
    }
}

fn common_parts(err: udulib_common::Error) -> (StatusCode, &'static str, String) {
    use udulib_common::Error;
    match err {
        Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
        Error::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
        Error::Auth(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
        Error::Database(db) => database_parts(db),
        other => {
            error!("Common error: {}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", other.to_string())
        }
    }
}

fn storage_parts(err: StorageError) -> (StatusCode, &'static str, String) {
    match err {
        StorageError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", "File not found in storage".to_string()),
        StorageError::InvalidReference(_) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "File is not in object storage".to_string(),
        ),
        other => {
            error!("Storage error: {}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", "Storage error".to_string())
        }
    }
}

fn preview_parts(err: PreviewError) -> (StatusCode, &'static str, String) {
    match err {
        PreviewError::Unsupported(_) | PreviewError::Conversion(_) => {
            (StatusCode::BAD_REQUEST, "PREVIEW_UNAVAILABLE", err.to_string())
        }
        other => {
            error!("Preview error: {}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, "PREVIEW_ERROR", "Error generating preview".to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let unauthorized = matches!(self, ApiError::Unauthorized(_))
            || matches!(self, ApiError::Common(udulib_common::Error::Auth(_)));
        let (status, code, detail) = self.parts();
        let body = Json(json!({ "detail": detail, "code": code }));

        if unauthorized {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// `Json` extractor whose rejections render as [`ApiError::BadRequest`]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

/// `Query` extractor whose rejections render as [`ApiError::BadRequest`]
pub struct QueryParams<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match axum::extract::Query::<T>::from_request_parts(parts, state).await {
            Ok(axum::extract::Query(value)) => Ok(QueryParams(value)),
            Err(rejection) => Err(query_rejection(rejection)),
        }
    }
}

fn query_rejection(rejection: QueryRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

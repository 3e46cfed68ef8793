//! Signed file route for the local storage backend

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::debug;

use crate::api::documents::content_disposition;
use crate::error::{ApiError, ApiResult, QueryParams};
use crate::storage::ObjectRef;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: i64,
    pub signature: String,
}

/// GET /files/{bucket}/{*key}
pub async fn get_file(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    QueryParams(query): QueryParams<SignedQuery>,
) -> ApiResult<Response> {
    let object = ObjectRef::new(bucket, key);
    let Some(stored) = state
        .storage
        .fetch_signed(&object, query.expires, &query.signature)
        .await?
    else {
        debug!("Rejected signature for {}", object.to_reference());
        return Err(ApiError::Forbidden("Invalid or expired signature".to_string()));
    };

    let content_type = HeaderValue::from_str(&stored.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&content_disposition("inline", object.filename()))
        .map_err(|e| ApiError::Internal(format!("Invalid Content-Disposition: {}", e)))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type), (header::CONTENT_DISPOSITION, disposition)],
        stored.data,
    )
        .into_response())
}

/// Build file routes
pub fn file_routes() -> Router<AppState> {
    Router::new().route("/files/:bucket/*key", get(get_file))
}

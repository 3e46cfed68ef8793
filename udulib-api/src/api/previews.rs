//! Document preview endpoints
//!
//! Each authenticated preview counts as a view. Public variants serve
//! approved documents only and record nothing.

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use udulib_common::models::{Document, HistoryAction};

use crate::api::documents::{content_disposition, ensure_public, ensure_visible, load_document};
use crate::auth::CurrentUser;
use crate::db::documents;
use crate::error::{ApiError, ApiResult, QueryParams};
use crate::preview::{Preview, PreviewError, PreviewService, PreviewSize};
use crate::AppState;

const PREVIEW_CACHE_CONTROL: &str = "public, max-age=3600";

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub size: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PreviewSupport {
    pub document_id: i64,
    pub is_supported: bool,
    pub file_category: String,
    pub file_type: String,
    pub filename: String,
}

fn preview_response(preview: Preview, filename: &str) -> ApiResult<Response> {
    let stem = filename.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(filename);
    let disposition = HeaderValue::from_str(&content_disposition("inline", &format!("preview_{}.jpg", stem)))
        .map_err(|e| ApiError::Internal(format!("Invalid Content-Disposition: {}", e)))?;
    let content_type = HeaderValue::from_str(&preview.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("image/jpeg"));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, HeaderValue::from_static(PREVIEW_CACHE_CONTROL)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        preview.data,
    )
        .into_response())
}

async fn render(state: &AppState, document: &Document, size: PreviewSize) -> ApiResult<Response> {
    let filename = document.stored_filename().to_string();
    if !PreviewService::is_supported(&filename) {
        return Err(PreviewError::Unsupported(filename).into());
    }
    let object = state.storage.download(&document.file_path).await?;
    let preview = state
        .preview
        .render(object.data, &object.content_type, &filename, size)
        .await?;
    preview_response(preview, &filename)
}

async fn render_for_viewer(
    state: &AppState,
    viewer: &CurrentUser,
    document_id: i64,
    size: PreviewSize,
) -> ApiResult<Response> {
    let document = load_document(state, document_id).await?;
    ensure_visible(&document, viewer)?;
    let response = render(state, &document, size).await?;
    documents::record_access(&state.db, document_id, viewer.id(), HistoryAction::View).await?;
    Ok(response)
}

async fn render_public(state: &AppState, document_id: i64, size: PreviewSize) -> ApiResult<Response> {
    let document = load_document(state, document_id).await?;
    ensure_public(&document)?;
    render(state, &document, size).await
}

fn support(document: &Document) -> PreviewSupport {
    let filename = document.stored_filename().to_string();
    PreviewSupport {
        document_id: document.document_id,
        is_supported: PreviewService::is_supported(&filename),
        file_category: PreviewService::category_name(&filename).to_string(),
        file_type: document.file_type.to_string(),
        filename,
    }
}

/// GET /documents/{id}/preview?size=
pub async fn preview(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(document_id): Path<i64>,
    QueryParams(query): QueryParams<PreviewQuery>,
) -> ApiResult<Response> {
    let size = PreviewSize::parse(query.size.as_deref());
    render_for_viewer(&state, &viewer, document_id, size).await
}

/// GET /documents/{id}/thumbnail
pub async fn thumbnail(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(document_id): Path<i64>,
) -> ApiResult<Response> {
    render_for_viewer(&state, &viewer, document_id, PreviewSize::Small).await
}

/// GET /documents/{id}/full-preview
pub async fn full_preview(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(document_id): Path<i64>,
) -> ApiResult<Response> {
    render_for_viewer(&state, &viewer, document_id, PreviewSize::Full).await
}

/// GET /documents/{id}/is-supported
pub async fn is_supported(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(document_id): Path<i64>,
) -> ApiResult<Json<PreviewSupport>> {
    let document = load_document(&state, document_id).await?;
    ensure_visible(&document, &viewer)?;
    Ok(Json(support(&document)))
}

/// GET /documents/public/{id}/preview?size=
pub async fn public_preview(
    State(state): State<AppState>,
    Path(document_id): Path<i64>,
    QueryParams(query): QueryParams<PreviewQuery>,
) -> ApiResult<Response> {
    render_public(&state, document_id, PreviewSize::parse(query.size.as_deref())).await
}

/// GET /documents/public/{id}/thumbnail
pub async fn public_thumbnail(State(state): State<AppState>, Path(document_id): Path<i64>) -> ApiResult<Response> {
    render_public(&state, document_id, PreviewSize::Small).await
}

/// GET /documents/public/{id}/full-preview
pub async fn public_full_preview(State(state): State<AppState>, Path(document_id): Path<i64>) -> ApiResult<Response> {
    render_public(&state, document_id, PreviewSize::Full).await
}

/// GET /documents/public/{id}/is-supported
pub async fn public_is_supported(
    State(state): State<AppState>,
    Path(document_id): Path<i64>,
) -> ApiResult<Json<PreviewSupport>> {
    let document = load_document(&state, document_id).await?;
    ensure_public(&document)?;
    Ok(Json(support(&document)))
}

/// Build preview routes
pub fn preview_routes() -> Router<AppState> {
    Router::new()
        .route("/documents/:id/preview", get(preview))
        .route("/documents/:id/thumbnail", get(thumbnail))
        .route("/documents/:id/full-preview", get(full_preview))
        .route("/documents/:id/is-supported", get(is_supported))
        .route("/documents/public/:id/preview", get(public_preview))
        .route("/documents/public/:id/thumbnail", get(public_thumbnail))
        .route("/documents/public/:id/full-preview", get(public_full_preview))
        .route("/documents/public/:id/is-supported", get(public_is_supported))
}

//! Shareable document links
//!
//! A link carries a random URL-safe token. Anyone holding the token can read
//! the document summary and download the file until the link expires; those
//! reads are not recorded in the document history.

use axum::{
    extract::{Path, State},
    response::Response,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use udulib_common::models::{Document, FileType, SharedLink};
use udulib_common::security::random_token;

use crate::api::documents::{attachment_response, download_filename, ensure_visible, load_document};
use crate::api::MessageResponse;
use crate::auth::CurrentUser;
use crate::db::shared_links;
use crate::error::{ApiError, ApiResult, JsonBody, QueryParams};
use crate::pagination::{Page, PageParams};
use crate::AppState;

/// Random bytes per token; 32 bytes encode to 43 characters
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Deserialize)]
pub struct LinkQuery {
    pub document_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLink {
    pub document_id: i64,
    pub expiration_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLink {
    pub expiration_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct DocumentSummary {
    pub document_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub file_type: FileType,
    pub file_size: i64,
    pub subject_id: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            document_id: doc.document_id,
            title: doc.title.clone(),
            description: doc.description.clone(),
            file_type: doc.file_type,
            file_size: doc.file_size,
            subject_id: doc.subject_id,
            created_at: doc.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SharedDocument {
    #[serde(flatten)]
    pub link: SharedLink,
    pub document: DocumentSummary,
}

fn ensure_future(expiration: Option<DateTime<Utc>>, now: DateTime<Utc>) -> ApiResult<()> {
    match expiration {
        Some(at) if at <= now => Err(ApiError::BadRequest(
            "expiration_date must be in the future".to_string(),
        )),
        _ => Ok(()),
    }
}

async fn load_link(state: &AppState, link_id: i64) -> ApiResult<SharedLink> {
    shared_links::get(&state.db, link_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Shared link"))
}

/// Unknown and expired tokens look the same to the caller
async fn load_active_link(state: &AppState, token: &str) -> ApiResult<SharedLink> {
    match shared_links::get_by_token(&state.db, token).await? {
        Some(link) if !link.is_expired(Utc::now()) => Ok(link),
        _ => Err(ApiError::not_found("Shared link")),
    }
}

/// GET /shared-links
pub async fn list_links(
    State(state): State<AppState>,
    viewer: CurrentUser,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<LinkQuery>,
) -> ApiResult<Json<Page<SharedLink>>> {
    let pagination = page.validate()?;
    let owner = (!viewer.is_admin()).then(|| viewer.id());
    let (items, total) = shared_links::list(&state.db, owner, query.document_id, pagination).await?;
    Ok(Json(Page::new(items, total, pagination)))
}

/// POST /shared-links
pub async fn create_link(
    State(state): State<AppState>,
    viewer: CurrentUser,
    JsonBody(req): JsonBody<CreateLink>,
) -> ApiResult<Json<SharedLink>> {
    ensure_future(req.expiration_date, Utc::now())?;
    let document = load_document(&state, req.document_id).await?;
    ensure_visible(&document, &viewer)?;

    let token = random_token(TOKEN_BYTES);
    let link = shared_links::create(&state.db, document.document_id, viewer.id(), &token, req.expiration_date).await?;
    info!("User {} shared document {} (link {})", viewer.id(), document.document_id, link.link_id);
    Ok(Json(link))
}

/// GET /shared-links/{id}
pub async fn get_link(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(link_id): Path<i64>,
) -> ApiResult<Json<SharedLink>> {
    let link = load_link(&state, link_id).await?;
    viewer.ensure_can_manage(link.user_id)?;
    Ok(Json(link))
}

/// GET /shared-links/token/{token}
pub async fn get_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<SharedDocument>> {
    let link = load_active_link(&state, &token).await?;
    let document = load_document(&state, link.document_id).await?;
    Ok(Json(SharedDocument {
        document: DocumentSummary::from(&document),
        link,
    }))
}

/// GET /shared-links/token/{token}/download
pub async fn download_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Response> {
    let link = load_active_link(&state, &token).await?;
    let document = load_document(&state, link.document_id).await?;
    let object = state.storage.download(&document.file_path).await?;
    attachment_response(object, &download_filename(&document))
}

/// PUT /shared-links/{id}
pub async fn update_link(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(link_id): Path<i64>,
    JsonBody(req): JsonBody<UpdateLink>,
) -> ApiResult<Json<SharedLink>> {
    let link = load_link(&state, link_id).await?;
    viewer.ensure_owner(link.user_id)?;
    ensure_future(req.expiration_date, Utc::now())?;
    Ok(Json(shared_links::set_expiration(&state.db, link_id, req.expiration_date).await?))
}

/// DELETE /shared-links/{id}
pub async fn delete_link(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(link_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let link = load_link(&state, link_id).await?;
    viewer.ensure_can_manage(link.user_id)?;
    shared_links::delete(&state.db, link_id).await?;
    Ok(Json(MessageResponse::new("Shared link deleted")))
}

/// Build shared link routes
pub fn shared_link_routes() -> Router<AppState> {
    Router::new()
        .route("/shared-links", get(list_links).post(create_link))
        .route("/shared-links/token/:token", get(get_by_token))
        .route("/shared-links/token/:token/download", get(download_by_token))
        .route(
            "/shared-links/:id",
            get(get_link).put(update_link).delete(delete_link),
        )
}

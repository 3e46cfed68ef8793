//! Document library endpoints
//!
//! Listing, upload, moderation, counters, likes and per-document tags.
//! Routes under `/documents/public/...` need no token and only ever expose
//! approved documents.

use axum::{
    extract::{Multipart, Path, RawQuery, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use udulib_common::models::{ContentStatus, Document, FileType, HistoryAction, Subject, Tag, User};

use crate::api::notifications::notify;
use crate::api::upload::{parse_tags_field, split_csv, UploadForm};
use crate::api::MessageResponse;
use crate::auth::{AdminUser, CurrentUser};
use crate::db::documents::{self, DocumentChanges, DocumentFilter, DocumentOrder, DocumentStats, LikeState, NewDocument};
use crate::db::notifications::{kind, NewNotification};
use crate::db::{subjects, tags, users};
use crate::error::{ApiError, ApiResult, JsonBody, QueryParams};
use crate::pagination::{Page, PageParams, Pagination};
use crate::storage::{file_extension, StoredObject};
use crate::AppState;

/// Filters accepted by the document listings
#[derive(Debug, Default, Deserialize)]
pub struct DocumentQuery {
    pub subject_id: Option<i64>,
    pub user_id: Option<i64>,
    pub major_id: Option<i64>,
    pub academic_year_id: Option<i64>,
    pub status: Option<ContentStatus>,
    pub file_type: Option<FileType>,
    /// Comma-separated, matches any
    pub tags: Option<String>,
    pub search: Option<String>,
    #[serde(alias = "sort_by")]
    pub order_by: Option<DocumentOrder>,
    #[serde(alias = "sort_desc")]
    pub order_desc: Option<bool>,
}

/// Ordering and status options of the tag listings
#[derive(Debug, Default, Deserialize)]
pub struct TagListQuery {
    pub status: Option<ContentStatus>,
    #[serde(alias = "sort_by")]
    pub order_by: Option<DocumentOrder>,
    #[serde(alias = "sort_desc")]
    pub order_desc: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDocument {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<ContentStatus>,
    /// Replaces the whole tag set when present
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: ContentStatus,
}

#[derive(Debug, Deserialize)]
pub struct TagsBody {
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TagNames {
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct DownloadUrl {
    pub download_url: String,
}

#[derive(Debug, Serialize)]
pub struct ViewRecorded {
    pub document_id: i64,
    pub view_count: i64,
}

/// List entry: the document row plus its tags
#[derive(Debug, Serialize)]
pub struct DocumentItem {
    #[serde(flatten)]
    pub document: Document,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Serialize)]
pub struct DocumentDetail {
    #[serde(flatten)]
    pub document: Document,
    pub subject: Option<Subject>,
    pub user: Option<User>,
    pub tags: Vec<Tag>,
    pub average_rating: f64,
    pub rating_count: i64,
    pub is_liked: bool,
}

pub(crate) async fn load_document(state: &AppState, document_id: i64) -> ApiResult<Document> {
    documents::get(&state.db, document_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Document"))
}

/// Pending and rejected documents are only shown to their owner and admins
pub(crate) fn ensure_visible(document: &Document, viewer: &CurrentUser) -> ApiResult<()> {
    if document.status == ContentStatus::Approved || viewer.can_manage(document.user_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Document is not available".to_string()))
    }
}

pub(crate) fn ensure_public(document: &Document) -> ApiResult<()> {
    if document.status == ContentStatus::Approved {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Document is not public".to_string()))
    }
}

/// Download name: the title, with the stored extension appended if missing
pub(crate) fn download_filename(document: &Document) -> String {
    let stored_ext = file_extension(document.stored_filename());
    if file_extension(&document.title).is_empty() && !stored_ext.is_empty() {
        format!("{}{}", document.title, stored_ext)
    } else {
        document.title.clone()
    }
}

/// RFC 5987 value for `filename*`
fn encode_rfc5987(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

pub(crate) fn content_disposition(disposition: &str, filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' { c } else { '_' })
        .collect();
    format!(
        "{}; filename=\"{}\"; filename*=UTF-8''{}",
        disposition,
        fallback,
        encode_rfc5987(filename)
    )
}

/// Blob response with an attachment `Content-Disposition`
pub(crate) fn attachment_response(object: StoredObject, filename: &str) -> ApiResult<Response> {
    let disposition = HeaderValue::from_str(&content_disposition("attachment", filename))
        .map_err(|e| ApiError::Internal(format!("Invalid Content-Disposition: {}", e)))?;
    let content_type = HeaderValue::from_str(&object.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type), (header::CONTENT_DISPOSITION, disposition)],
        object.data,
    )
        .into_response())
}

async fn with_tags(state: &AppState, docs: Vec<Document>) -> ApiResult<Vec<DocumentItem>> {
    let ids: Vec<i64> = docs.iter().map(|d| d.document_id).collect();
    let mut tag_map = documents::tags_for(&state.db, &ids).await?;
    Ok(docs
        .into_iter()
        .map(|document| {
            let tags = tag_map.remove(&document.document_id).unwrap_or_default();
            DocumentItem { document, tags }
        })
        .collect())
}

async fn list_page(state: &AppState, filter: DocumentFilter, pagination: Pagination) -> ApiResult<Page<DocumentItem>> {
    let (docs, total) = documents::list(&state.db, &filter, pagination).await?;
    Ok(Page::new(with_tags(state, docs).await?, total, pagination))
}

async fn detail(state: &AppState, document: Document, viewer: Option<i64>) -> ApiResult<DocumentDetail> {
    let subject = subjects::get(&state.db, document.subject_id).await?;
    let user = users::get_by_id(&state.db, document.user_id).await?;
    let tags = tags::for_document(&state.db, document.document_id).await?;
    let rating = documents::rating_summary(&state.db, document.document_id).await?;
    let is_liked = match viewer {
        Some(user_id) => documents::is_liked(&state.db, document.document_id, user_id).await?,
        None => false,
    };
    Ok(DocumentDetail {
        document,
        subject,
        user,
        tags,
        average_rating: rating.average_rating,
        rating_count: rating.rating_count,
        is_liked,
    })
}

impl DocumentQuery {
    fn into_filter(self) -> DocumentFilter {
        DocumentFilter {
            subject_id: self.subject_id,
            user_id: self.user_id,
            major_id: self.major_id,
            academic_year_id: self.academic_year_id,
            status: self.status,
            file_type: self.file_type,
            tags: tags::normalize_names(split_csv(self.tags.as_deref())),
            search: self.search,
            visible_to: None,
            order_by: self.order_by.unwrap_or_default(),
            order_desc: self.order_desc.unwrap_or(true),
        }
    }
}

/// Tag filter for the tag listings
///
/// The status defaults to approved. Non-admins are further limited to
/// approved documents and their own, whatever status they request.
fn tag_filter(names: Vec<String>, query: TagListQuery, viewer: Option<&CurrentUser>) -> ApiResult<DocumentFilter> {
    let names = tags::normalize_names(names);
    if names.is_empty() {
        return Err(ApiError::BadRequest("At least one tag is required".to_string()));
    }
    let mut filter = DocumentFilter {
        tags: names,
        order_by: query.order_by.unwrap_or_default(),
        order_desc: query.order_desc.unwrap_or(true),
        ..Default::default()
    };
    match viewer {
        Some(viewer) => {
            filter.status = Some(query.status.unwrap_or(ContentStatus::Approved));
            if !viewer.is_admin() {
                filter.visible_to = Some(viewer.id());
            }
        }
        None => filter.status = Some(ContentStatus::Approved),
    }
    Ok(filter)
}

/// Every `tags=` value of a query string, comma lists included
fn repeated_tags(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    url::form_urlencoded::parse(raw.as_bytes())
        .filter(|(key, _)| key == "tags")
        .flat_map(|(_, value)| value.split(',').map(str::to_string).collect::<Vec<_>>())
        .collect()
}

/// GET /documents
pub async fn list_documents(
    State(state): State<AppState>,
    viewer: CurrentUser,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<DocumentQuery>,
) -> ApiResult<Json<Page<DocumentItem>>> {
    let pagination = page.validate()?;
    let mut filter = query.into_filter();
    if !viewer.is_admin() {
        filter.visible_to = Some(viewer.id());
    }
    Ok(Json(list_page(&state, filter, pagination).await?))
}

/// GET /documents/public
pub async fn list_public_documents(
    State(state): State<AppState>,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<DocumentQuery>,
) -> ApiResult<Json<Page<DocumentItem>>> {
    let pagination = page.validate()?;
    let mut filter = query.into_filter();
    filter.status = Some(ContentStatus::Approved);
    Ok(Json(list_page(&state, filter, pagination).await?))
}

/// GET /documents/count-document
pub async fn count_documents(State(state): State<AppState>) -> ApiResult<Json<CountResponse>> {
    let count = documents::count_all(&state.db).await?;
    Ok(Json(CountResponse { count }))
}

/// GET /documents/academic-year/{year_id}
pub async fn list_by_academic_year(
    State(state): State<AppState>,
    Path(year_id): Path<i64>,
    QueryParams(page): QueryParams<PageParams>,
) -> ApiResult<Json<Page<DocumentItem>>> {
    let pagination = page.validate()?;
    let filter = DocumentFilter {
        academic_year_id: Some(year_id),
        status: Some(ContentStatus::Approved),
        order_desc: true,
        ..Default::default()
    };
    Ok(Json(list_page(&state, filter, pagination).await?))
}

/// GET /documents/by-tag/{tag}
pub async fn list_by_tag(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(tag): Path<String>,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<TagListQuery>,
) -> ApiResult<Json<Page<DocumentItem>>> {
    let pagination = page.validate()?;
    let filter = tag_filter(vec![tag], query, Some(&viewer))?;
    Ok(Json(list_page(&state, filter, pagination).await?))
}

/// GET /documents/public/by-tag/{tag}
pub async fn list_public_by_tag(
    State(state): State<AppState>,
    Path(tag): Path<String>,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<TagListQuery>,
) -> ApiResult<Json<Page<DocumentItem>>> {
    let pagination = page.validate()?;
    let filter = tag_filter(vec![tag], query, None)?;
    Ok(Json(list_page(&state, filter, pagination).await?))
}

/// GET /documents/by-tags?tags=a&tags=b
pub async fn list_by_tags(
    State(state): State<AppState>,
    viewer: CurrentUser,
    RawQuery(raw): RawQuery,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<TagListQuery>,
) -> ApiResult<Json<Page<DocumentItem>>> {
    let pagination = page.validate()?;
    let filter = tag_filter(repeated_tags(raw.as_deref()), query, Some(&viewer))?;
    Ok(Json(list_page(&state, filter, pagination).await?))
}

/// GET /documents/public/by-tags?tags=a&tags=b
pub async fn list_public_by_tags(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<TagListQuery>,
) -> ApiResult<Json<Page<DocumentItem>>> {
    let pagination = page.validate()?;
    let filter = tag_filter(repeated_tags(raw.as_deref()), query, None)?;
    Ok(Json(list_page(&state, filter, pagination).await?))
}

/// GET /documents/{id}
pub async fn get_document(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(document_id): Path<i64>,
) -> ApiResult<Json<DocumentDetail>> {
    let document = load_document(&state, document_id).await?;
    ensure_visible(&document, &viewer)?;
    Ok(Json(detail(&state, document, Some(viewer.id())).await?))
}

/// GET /documents/public/{id}
pub async fn get_public_document(
    State(state): State<AppState>,
    Path(document_id): Path<i64>,
) -> ApiResult<Json<DocumentDetail>> {
    let document = load_document(&state, document_id).await?;
    ensure_public(&document)?;
    Ok(Json(detail(&state, document, None).await?))
}

/// POST /documents
///
/// Multipart fields: `title`, `description`, `subject_id`, `tags`, `file`.
pub async fn upload_document(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<DocumentDetail>)> {
    let mut form = UploadForm::read(multipart, "file", state.settings.storage.max_upload_bytes).await?;
    let title = form.require_text("title")?.to_string();
    let subject_id: i64 = form
        .require_text("subject_id")?
        .parse()
        .map_err(|_| ApiError::BadRequest("subject_id must be an integer".to_string()))?;
    let description = form.text("description").map(str::to_string);
    let tag_names = tags::normalize_names(parse_tags_field(form.text("tags")));
    let file = form.require_file()?;

    subjects::get(&state.db, subject_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Subject"))?;

    let file_size = file.data.len() as i64;
    let file_type = FileType::from_filename(&file.filename);
    let bucket = state.storage.buckets().documents.clone();
    let reference = state.storage.upload(&bucket, file.data, &file.filename, None).await?;

    let status = if user.is_admin() {
        ContentStatus::Approved
    } else {
        ContentStatus::Pending
    };
    let new = NewDocument {
        title,
        description,
        file_path: reference.clone(),
        file_size,
        file_type,
        subject_id,
        user_id: user.user_id,
        status,
    };
    let document = match documents::create(&state.db, new, &tag_names).await {
        Ok(document) => document,
        Err(e) => {
            state.storage.delete_quietly(&reference).await;
            return Err(e.into());
        }
    };

    info!(
        "User {} uploaded document {} ({}, {} bytes, {})",
        user.user_id, document.document_id, file_type, file_size, status
    );
    let body = detail(&state, document, Some(user.user_id)).await?;
    Ok((StatusCode::CREATED, Json(body)))
}

/// PUT /documents/{id}
pub async fn update_document(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(document_id): Path<i64>,
    JsonBody(req): JsonBody<UpdateDocument>,
) -> ApiResult<Json<DocumentDetail>> {
    let document = load_document(&state, document_id).await?;
    viewer.ensure_can_manage(document.user_id)?;
    if req.status.is_some() && !viewer.is_admin() {
        return Err(ApiError::Forbidden("Only administrators can change document status".to_string()));
    }

    let title = match req.title {
        Some(title) if title.trim().is_empty() => {
            return Err(ApiError::BadRequest("title must not be empty".to_string()));
        }
        other => other.map(|t| t.trim().to_string()),
    };
    let tag_names = req.tags.map(tags::normalize_names);
    let changes = DocumentChanges {
        title,
        description: req.description,
        status: req.status,
    };
    let updated = documents::update(&state.db, document_id, changes, tag_names.as_deref()).await?;
    Ok(Json(detail(&state, updated, Some(viewer.id())).await?))
}

/// PATCH /documents/{id}/status
pub async fn moderate_document(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(document_id): Path<i64>,
    JsonBody(req): JsonBody<StatusUpdate>,
) -> ApiResult<Json<Document>> {
    load_document(&state, document_id).await?;
    let updated = documents::set_status(&state.db, document_id, req.status).await?;
    info!("Admin {} set document {} to {}", admin.id(), document_id, req.status);

    let content = format!("Your document \"{}\" is now {}", updated.title, req.status);
    notify(
        &state,
        NewNotification {
            user_id: updated.user_id,
            title: "Document status updated",
            content: &content,
            notification_type: kind::DOCUMENT_STATUS,
            reference_id: Some(document_id),
        },
    )
    .await;
    Ok(Json(updated))
}

/// DELETE /documents/{id}
pub async fn delete_document(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(document_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let document = load_document(&state, document_id).await?;
    viewer.ensure_can_manage(document.user_id)?;

    documents::delete(&state.db, document_id).await?;
    state.storage.delete_quietly(&document.file_path).await;
    info!("User {} deleted document {}", viewer.id(), document_id);
    Ok(Json(MessageResponse::new("Document deleted")))
}

/// POST /documents/{id}/view
pub async fn record_view(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(document_id): Path<i64>,
) -> ApiResult<Json<ViewRecorded>> {
    let document = load_document(&state, document_id).await?;
    ensure_visible(&document, &viewer)?;
    documents::record_access(&state.db, document_id, viewer.id(), HistoryAction::View).await?;
    Ok(Json(ViewRecorded {
        document_id,
        view_count: document.view_count + 1,
    }))
}

/// GET /documents/{id}/download
pub async fn download_document(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(document_id): Path<i64>,
) -> ApiResult<Response> {
    let document = load_document(&state, document_id).await?;
    ensure_visible(&document, &viewer)?;
    let object = state.storage.download(&document.file_path).await?;
    documents::record_access(&state.db, document_id, viewer.id(), HistoryAction::Download).await?;
    attachment_response(object, &download_filename(&document))
}

/// GET /documents/{id}/download-url
pub async fn download_url(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(document_id): Path<i64>,
) -> ApiResult<Json<DownloadUrl>> {
    let document = load_document(&state, document_id).await?;
    ensure_visible(&document, &viewer)?;
    let download_url = state.storage.presigned_url(&document.file_path)?;
    documents::record_access(&state.db, document_id, viewer.id(), HistoryAction::Download).await?;
    Ok(Json(DownloadUrl { download_url }))
}

/// GET /documents/public/{id}/download
pub async fn download_public_document(
    State(state): State<AppState>,
    Path(document_id): Path<i64>,
) -> ApiResult<Response> {
    let document = load_document(&state, document_id).await?;
    ensure_public(&document)?;
    let object = state.storage.download(&document.file_path).await?;
    attachment_response(object, &download_filename(&document))
}

/// POST /documents/{id}/like
pub async fn like_document(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(document_id): Path<i64>,
) -> ApiResult<Json<LikeState>> {
    let document = load_document(&state, document_id).await?;
    ensure_visible(&document, &viewer)?;
    Ok(Json(documents::like(&state.db, document_id, viewer.id()).await?))
}

/// DELETE /documents/{id}/like
pub async fn unlike_document(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(document_id): Path<i64>,
) -> ApiResult<Json<LikeState>> {
    load_document(&state, document_id).await?;
    Ok(Json(documents::unlike(&state.db, document_id, viewer.id()).await?))
}

/// GET /documents/{id}/stats
pub async fn document_stats(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(document_id): Path<i64>,
) -> ApiResult<Json<DocumentStats>> {
    let document = load_document(&state, document_id).await?;
    ensure_visible(&document, &viewer)?;
    Ok(Json(documents::stats(&state.db, &document, Some(viewer.id())).await?))
}

/// GET /documents/{id}/tags
pub async fn document_tags(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(document_id): Path<i64>,
) -> ApiResult<Json<Vec<Tag>>> {
    let document = load_document(&state, document_id).await?;
    ensure_visible(&document, &viewer)?;
    Ok(Json(tags::for_document(&state.db, document_id).await?))
}

/// POST /documents/{id}/tags
pub async fn add_document_tags(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(document_id): Path<i64>,
    JsonBody(req): JsonBody<TagsBody>,
) -> ApiResult<Json<TagNames>> {
    let document = load_document(&state, document_id).await?;
    viewer.ensure_can_manage(document.user_id)?;
    let names = tags::normalize_names(req.tags);
    if names.is_empty() {
        return Err(ApiError::BadRequest("At least one tag is required".to_string()));
    }

    let mut tx = state.db.begin().await?;
    tags::attach(&mut tx, document_id, &names).await?;
    tx.commit().await?;

    let current = tags::for_document(&state.db, document_id).await?;
    Ok(Json(TagNames {
        tags: current.into_iter().map(|t| t.tag_name).collect(),
    }))
}

/// DELETE /documents/{id}/tags/{tag_name}
pub async fn remove_document_tag(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path((document_id, tag_name)): Path<(i64, String)>,
) -> ApiResult<Json<MessageResponse>> {
    let document = load_document(&state, document_id).await?;
    viewer.ensure_can_manage(document.user_id)?;
    if !tags::detach(&state.db, document_id, tag_name.trim()).await? {
        return Err(ApiError::NotFound("Tag is not attached to this document".to_string()));
    }
    Ok(Json(MessageResponse::new(format!("Tag {} removed", tag_name.trim()))))
}

/// Build document routes
pub fn document_routes() -> Router<AppState> {
    Router::new()
        .route("/documents", get(list_documents).post(upload_document))
        .route("/documents/public", get(list_public_documents))
        .route("/documents/count-document", get(count_documents))
        .route("/documents/academic-year/:year_id", get(list_by_academic_year))
        .route("/documents/by-tag/:tag", get(list_by_tag))
        .route("/documents/by-tags", get(list_by_tags))
        .route("/documents/public/by-tag/:tag", get(list_public_by_tag))
        .route("/documents/public/by-tags", get(list_public_by_tags))
        .route("/documents/public/:id", get(get_public_document))
        .route("/documents/public/:id/download", get(download_public_document))
        .route(
            "/documents/:id",
            get(get_document).put(update_document).delete(delete_document),
        )
        .route("/documents/:id/status", patch(moderate_document))
        .route("/documents/:id/view", post(record_view))
        .route("/documents/:id/download", get(download_document))
        .route("/documents/:id/download-url", get(download_url))
        .route("/documents/:id/like", post(like_document).delete(unlike_document))
        .route("/documents/:id/stats", get(document_stats))
        .route("/documents/:id/tags", get(document_tags).post(add_document_tags))
        .route("/documents/:id/tags/:tag_name", delete(remove_document_tag))
}

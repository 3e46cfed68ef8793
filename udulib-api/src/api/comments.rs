//! Document comments

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;
use udulib_common::models::{Comment, ContentStatus};

use crate::api::documents::{ensure_visible, load_document};
use crate::api::notifications::notify;
use crate::api::MessageResponse;
use crate::auth::CurrentUser;
use crate::db::comments::{self, CommentFilter, CommentWithAuthor};
use crate::db::notifications::{kind, NewNotification};
use crate::error::{ApiError, ApiResult, JsonBody, QueryParams};
use crate::pagination::{Page, PageParams};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CommentQuery {
    pub document_id: Option<i64>,
    pub user_id: Option<i64>,
    /// Admins only; others always see approved comments
    pub status: Option<ContentStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CreateComment {
    pub document_id: i64,
    pub content: String,
    pub parent_comment_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateComment {
    pub content: Option<String>,
    pub status: Option<ContentStatus>,
}

fn comment_content(raw: &str) -> ApiResult<String> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest("Comment content must not be empty".to_string()));
    }
    Ok(content.to_string())
}

async fn load_comment(state: &AppState, comment_id: i64) -> ApiResult<Comment> {
    comments::get(&state.db, comment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment"))
}

/// GET /comments
pub async fn list_comments(
    State(state): State<AppState>,
    viewer: CurrentUser,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<CommentQuery>,
) -> ApiResult<Json<Page<CommentWithAuthor>>> {
    let pagination = page.validate()?;
    let status = if viewer.is_admin() {
        query.status
    } else {
        Some(ContentStatus::Approved)
    };
    let filter = CommentFilter {
        document_id: query.document_id,
        user_id: query.user_id,
        status,
    };
    let (items, total) = comments::list(&state.db, &filter, pagination).await?;
    Ok(Json(Page::new(items, total, pagination)))
}

/// POST /comments
pub async fn create_comment(
    State(state): State<AppState>,
    viewer: CurrentUser,
    JsonBody(req): JsonBody<CreateComment>,
) -> ApiResult<Json<Comment>> {
    let content = comment_content(&req.content)?;
    let document = load_document(&state, req.document_id).await?;
    ensure_visible(&document, &viewer)?;
    if let Some(parent_id) = req.parent_comment_id {
        let parent = load_comment(&state, parent_id).await?;
        if parent.document_id != document.document_id {
            return Err(ApiError::BadRequest(
                "Parent comment belongs to a different document".to_string(),
            ));
        }
    }

    let comment = comments::create(&state.db, document.document_id, viewer.id(), &content, req.parent_comment_id).await?;
    info!("User {} commented on document {}", viewer.id(), document.document_id);

    if document.user_id != viewer.id() {
        let message = format!("{} commented on \"{}\"", viewer.0.full_name, document.title);
        notify(
            &state,
            NewNotification {
                user_id: document.user_id,
                title: "New comment on your document",
                content: &message,
                notification_type: kind::COMMENT,
                reference_id: Some(document.document_id),
            },
        )
        .await;
    }
    Ok(Json(comment))
}

/// GET /comments/{id}
pub async fn get_comment(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(comment_id): Path<i64>,
) -> ApiResult<Json<Comment>> {
    let comment = load_comment(&state, comment_id).await?;
    if comment.status != ContentStatus::Approved && !viewer.can_manage(comment.user_id) {
        return Err(ApiError::not_found("Comment"));
    }
    Ok(Json(comment))
}

/// PUT /comments/{id}
pub async fn update_comment(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(comment_id): Path<i64>,
    JsonBody(req): JsonBody<UpdateComment>,
) -> ApiResult<Json<Comment>> {
    let comment = load_comment(&state, comment_id).await?;
    viewer.ensure_can_manage(comment.user_id)?;
    if req.status.is_some() && !viewer.is_admin() {
        return Err(ApiError::Forbidden("Only administrators can moderate comments".to_string()));
    }
    let content = req.content.as_deref().map(comment_content).transpose()?;
    Ok(Json(comments::update(&state.db, comment_id, content, req.status).await?))
}

/// DELETE /comments/{id}
pub async fn delete_comment(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(comment_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let comment = load_comment(&state, comment_id).await?;
    viewer.ensure_can_manage(comment.user_id)?;
    comments::delete(&state.db, comment_id).await?;
    Ok(Json(MessageResponse::new("Comment deleted")))
}

/// Build comment routes
pub fn comment_routes() -> Router<AppState> {
    Router::new()
        .route("/comments", get(list_comments).post(create_comment))
        .route(
            "/comments/:id",
            get(get_comment).put(update_comment).delete(delete_comment),
        )
}

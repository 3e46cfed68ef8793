//! Forum posts

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::str::FromStr;
use tracing::info;
use udulib_common::models::{ContentStatus, ForumPost};

use crate::api::MessageResponse;
use crate::auth::CurrentUser;
use crate::db::documents::LikeState;
use crate::db::forum_posts::{self, PostFilter, PostSummary};
use crate::db::forums;
use crate::error::{ApiError, ApiResult, JsonBody, QueryParams};
use crate::pagination::{Page, PageParams};
use crate::AppState;

pub const MAX_TITLE_CHARS: usize = 255;

#[derive(Debug, Deserialize)]
pub struct PostQuery {
    pub forum_id: Option<i64>,
    pub user_id: Option<i64>,
    pub status: Option<ContentStatus>,
}

/// Body of `POST /forum-posts/search`; `status` is free text and validated
#[derive(Debug, Default, Deserialize)]
pub struct PostSearch {
    pub query: Option<String>,
    pub forum_id: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePost {
    pub forum_id: i64,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub content: Option<String>,
    pub status: Option<ContentStatus>,
}

fn post_title(raw: &str) -> ApiResult<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ApiError::BadRequest(format!(
            "title must be at most {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(title.to_string())
}

fn post_content(raw: &str) -> ApiResult<String> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".to_string()));
    }
    Ok(content.to_string())
}

async fn load_post(state: &AppState, post_id: i64) -> ApiResult<ForumPost> {
    forum_posts::get(&state.db, post_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Forum post"))
}

/// GET /forum-posts
pub async fn list_posts(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<PostQuery>,
) -> ApiResult<Json<Page<PostSummary>>> {
    let pagination = page.validate()?;
    let filter = PostFilter {
        forum_id: query.forum_id,
        user_id: query.user_id,
        status: query.status,
        search: None,
    };
    let (items, total) = forum_posts::list(&state.db, &filter, pagination).await?;
    Ok(Json(Page::new(items, total, pagination)))
}

/// POST /forum-posts/search
pub async fn search_posts(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    QueryParams(page): QueryParams<PageParams>,
    JsonBody(req): JsonBody<PostSearch>,
) -> ApiResult<Json<Page<PostSummary>>> {
    let pagination = page.validate()?;
    let status = req
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(ContentStatus::from_str)
        .transpose()?;
    let filter = PostFilter {
        forum_id: req.forum_id,
        user_id: None,
        status,
        search: req.query,
    };
    let (items, total) = forum_posts::list(&state.db, &filter, pagination).await?;
    Ok(Json(Page::new(items, total, pagination)))
}

/// GET /forum-posts/{id}
pub async fn get_post(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    Path(post_id): Path<i64>,
) -> ApiResult<Json<ForumPost>> {
    let post = forum_posts::view(&state.db, post_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Forum post"))?;
    Ok(Json(post))
}

/// POST /forum-posts
pub async fn create_post(
    State(state): State<AppState>,
    viewer: CurrentUser,
    JsonBody(req): JsonBody<CreatePost>,
) -> ApiResult<Json<ForumPost>> {
    let title = post_title(&req.title)?;
    let content = post_content(&req.content)?;
    forums::get(&state.db, req.forum_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Forum"))?;

    let post = forum_posts::create(&state.db, req.forum_id, viewer.id(), &title, &content).await?;
    info!("User {} posted {} in forum {}", viewer.id(), post.post_id, post.forum_id);
    Ok(Json(post))
}

/// PUT /forum-posts/{id}
pub async fn update_post(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(post_id): Path<i64>,
    JsonBody(req): JsonBody<UpdatePost>,
) -> ApiResult<Json<ForumPost>> {
    let post = load_post(&state, post_id).await?;
    viewer.ensure_can_manage(post.user_id)?;
    if req.status.is_some() && !viewer.is_admin() {
        return Err(ApiError::Forbidden("Only administrators can moderate posts".to_string()));
    }
    let title = req.title.as_deref().map(post_title).transpose()?;
    let content = req.content.as_deref().map(post_content).transpose()?;
    Ok(Json(forum_posts::update(&state.db, post_id, title, content, req.status).await?))
}

/// DELETE /forum-posts/{id}
pub async fn delete_post(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(post_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let post = load_post(&state, post_id).await?;
    viewer.ensure_can_manage(post.user_id)?;
    forum_posts::delete(&state.db, post_id).await?;
    info!("User {} deleted forum post {}", viewer.id(), post_id);
    Ok(Json(MessageResponse::new("Forum post deleted")))
}

/// POST /forum-posts/{id}/like
pub async fn like_post(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(post_id): Path<i64>,
) -> ApiResult<Json<LikeState>> {
    load_post(&state, post_id).await?;
    Ok(Json(forum_posts::like(&state.db, post_id, viewer.id()).await?))
}

/// DELETE /forum-posts/{id}/like
pub async fn unlike_post(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(post_id): Path<i64>,
) -> ApiResult<Json<LikeState>> {
    load_post(&state, post_id).await?;
    Ok(Json(forum_posts::unlike(&state.db, post_id, viewer.id()).await?))
}

/// Build forum post routes
pub fn forum_post_routes() -> Router<AppState> {
    Router::new()
        .route("/forum-posts", get(list_posts).post(create_post))
        .route("/forum-posts/search", post(search_posts))
        .route("/forum-posts/:id", get(get_post).put(update_post).delete(delete_post))
        .route("/forum-posts/:id/like", post(like_post).delete(unlike_post))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_title_limits() {
        assert_eq!(post_title("  Exam tips ").unwrap(), "Exam tips");
        assert!(post_title("").is_err());
        assert!(post_title(&"x".repeat(MAX_TITLE_CHARS)).is_ok());
        assert!(post_title(&"x".repeat(MAX_TITLE_CHARS + 1)).is_err());
    }
}

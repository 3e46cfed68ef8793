//! Replies to forum posts

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use udulib_common::models::{ContentStatus, ForumReply};

use crate::api::notifications::notify;
use crate::api::MessageResponse;
use crate::auth::CurrentUser;
use crate::db::forum_posts;
use crate::db::forum_replies::{self, ReplyFilter};
use crate::db::notifications::{kind, NewNotification};
use crate::error::{ApiError, ApiResult, JsonBody, QueryParams};
use crate::pagination::{Page, PageParams};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ReplyQuery {
    pub post_id: Option<i64>,
    pub user_id: Option<i64>,
    pub status: Option<ContentStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReply {
    pub post_id: i64,
    pub content: String,
    pub parent_reply_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReply {
    pub content: Option<String>,
    pub status: Option<ContentStatus>,
}

#[derive(Debug, Serialize)]
pub struct ReplyWithChildren {
    #[serde(flatten)]
    pub reply: ForumReply,
    pub child_replies: Vec<ForumReply>,
}

fn reply_content(raw: &str) -> ApiResult<String> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest("Reply content must not be empty".to_string()));
    }
    Ok(content.to_string())
}

async fn load_reply(state: &AppState, reply_id: i64) -> ApiResult<ForumReply> {
    forum_replies::get(&state.db, reply_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Reply"))
}

/// GET /forum-replies
pub async fn list_replies(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<ReplyQuery>,
) -> ApiResult<Json<Page<ForumReply>>> {
    let pagination = page.validate()?;
    let filter = ReplyFilter {
        post_id: query.post_id,
        user_id: query.user_id,
        status: query.status,
    };
    let (items, total) = forum_replies::list(&state.db, &filter, pagination).await?;
    Ok(Json(Page::new(items, total, pagination)))
}

/// GET /forum-replies/{id}
pub async fn get_reply(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    Path(reply_id): Path<i64>,
) -> ApiResult<Json<ReplyWithChildren>> {
    let reply = load_reply(&state, reply_id).await?;
    let child_replies = forum_replies::children(&state.db, reply_id).await?;
    Ok(Json(ReplyWithChildren { reply, child_replies }))
}

/// POST /forum-replies
pub async fn create_reply(
    State(state): State<AppState>,
    viewer: CurrentUser,
    JsonBody(req): JsonBody<CreateReply>,
) -> ApiResult<Json<ForumReply>> {
    let content = reply_content(&req.content)?;
    let post = forum_posts::get(&state.db, req.post_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Forum post"))?;
    if let Some(parent_id) = req.parent_reply_id {
        let parent = load_reply(&state, parent_id).await?;
        if parent.post_id != post.post_id {
            return Err(ApiError::BadRequest("Parent reply belongs to a different post".to_string()));
        }
    }

    let reply = forum_replies::create(&state.db, post.post_id, viewer.id(), &content, req.parent_reply_id).await?;

    if post.user_id != viewer.id() {
        let message = format!("{} replied to \"{}\"", viewer.0.full_name, post.title);
        notify(
            &state,
            NewNotification {
                user_id: post.user_id,
                title: "New reply to your post",
                content: &message,
                notification_type: kind::FORUM_REPLY,
                reference_id: Some(post.post_id),
            },
        )
        .await;
    }
    Ok(Json(reply))
}

/// PUT /forum-replies/{id}
pub async fn update_reply(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(reply_id): Path<i64>,
    JsonBody(req): JsonBody<UpdateReply>,
) -> ApiResult<Json<ForumReply>> {
    let reply = load_reply(&state, reply_id).await?;
    viewer.ensure_can_manage(reply.user_id)?;
    if req.status.is_some() && !viewer.is_admin() {
        return Err(ApiError::Forbidden("Only administrators can moderate replies".to_string()));
    }
    let content = req.content.as_deref().map(reply_content).transpose()?;
    Ok(Json(forum_replies::update(&state.db, reply_id, content, req.status).await?))
}

/// DELETE /forum-replies/{id}
pub async fn delete_reply(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(reply_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let reply = load_reply(&state, reply_id).await?;
    viewer.ensure_can_manage(reply.user_id)?;
    forum_replies::delete(&state.db, reply_id).await?;
    Ok(Json(MessageResponse::new("Reply deleted")))
}

/// Build forum reply routes
pub fn forum_reply_routes() -> Router<AppState> {
    Router::new()
        .route("/forum-replies", get(list_replies).post(create_reply))
        .route(
            "/forum-replies/:id",
            get(get_reply).put(update_reply).delete(delete_reply),
        )
}

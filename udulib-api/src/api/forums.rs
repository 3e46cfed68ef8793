//! Subject forums

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;
use udulib_common::models::Forum;

use crate::api::MessageResponse;
use crate::auth::{AdminUser, CurrentUser};
use crate::db::forums::{self, ForumSummary};
use crate::db::subjects;
use crate::error::{ApiError, ApiResult, JsonBody, QueryParams};
use crate::pagination::{Page, PageParams};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateForum {
    pub subject_id: i64,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateForum {
    pub description: Option<String>,
}

/// GET /forums
pub async fn list_forums(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    QueryParams(page): QueryParams<PageParams>,
) -> ApiResult<Json<Page<ForumSummary>>> {
    let pagination = page.validate()?;
    let (items, total) = forums::list(&state.db, pagination).await?;
    Ok(Json(Page::new(items, total, pagination)))
}

/// GET /forums/{id}
pub async fn get_forum(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    Path(forum_id): Path<i64>,
) -> ApiResult<Json<ForumSummary>> {
    let forum = forums::summary(&state.db, forum_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Forum"))?;
    Ok(Json(forum))
}

/// GET /forums/subject/{subject_id}
pub async fn get_forum_by_subject(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    Path(subject_id): Path<i64>,
) -> ApiResult<Json<ForumSummary>> {
    let forum = forums::summary_by_subject(&state.db, subject_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Forum"))?;
    Ok(Json(forum))
}

/// POST /forums
pub async fn create_forum(
    State(state): State<AppState>,
    admin: AdminUser,
    JsonBody(req): JsonBody<CreateForum>,
) -> ApiResult<Json<Forum>> {
    subjects::get(&state.db, req.subject_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Subject"))?;
    if forums::summary_by_subject(&state.db, req.subject_id).await?.is_some() {
        return Err(ApiError::BadRequest("This subject already has a forum".to_string()));
    }
    let forum = forums::create(&state.db, req.subject_id, req.description.as_deref()).await?;
    info!("Admin {} created forum {} for subject {}", admin.id(), forum.forum_id, forum.subject_id);
    Ok(Json(forum))
}

/// PUT /forums/{id}
pub async fn update_forum(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(forum_id): Path<i64>,
    JsonBody(req): JsonBody<UpdateForum>,
) -> ApiResult<Json<Forum>> {
    forums::get(&state.db, forum_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Forum"))?;
    Ok(Json(forums::set_description(&state.db, forum_id, req.description.as_deref()).await?))
}

/// DELETE /forums/{id}
pub async fn delete_forum(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(forum_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    if !forums::delete(&state.db, forum_id).await? {
        return Err(ApiError::not_found("Forum"));
    }
    info!("Admin {} deleted forum {}", admin.id(), forum_id);
    Ok(Json(MessageResponse::new("Forum deleted")))
}

/// Build forum routes
pub fn forum_routes() -> Router<AppState> {
    Router::new()
        .route("/forums", get(list_forums).post(create_forum))
        .route("/forums/subject/:subject_id", get(get_forum_by_subject))
        .route("/forums/:id", get(get_forum).put(update_forum).delete(delete_forum))
}

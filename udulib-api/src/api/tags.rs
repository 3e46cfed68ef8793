//! Tag endpoints

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;
use udulib_common::models::Tag;

use crate::api::MessageResponse;
use crate::auth::{AdminUser, CurrentUser};
use crate::db::tags::{self, TagWithCount};
use crate::error::{ApiError, ApiResult, JsonBody, QueryParams};
use crate::pagination::{Page, PageParams};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TagBody {
    pub tag_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

/// Trimmed tag name; empty names are rejected
pub(crate) fn tag_name(raw: &str) -> ApiResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Tag name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

async fn ensure_name_free(state: &AppState, name: &str, except: Option<i64>) -> ApiResult<()> {
    if let Some(existing) = tags::get_by_name(&state.db, name).await? {
        if Some(existing.tag_id) != except {
            return Err(ApiError::BadRequest(format!("Tag '{}' already exists", name)));
        }
    }
    Ok(())
}

/// GET /tags
pub async fn list_tags(
    State(state): State<AppState>,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<SearchQuery>,
) -> ApiResult<Json<Page<Tag>>> {
    let pagination = page.validate()?;
    let (items, total) = tags::list(&state.db, query.search.as_deref(), pagination).await?;
    Ok(Json(Page::new(items, total, pagination)))
}

/// GET /tags/with-document-count
pub async fn list_with_counts(
    State(state): State<AppState>,
    QueryParams(page): QueryParams<PageParams>,
) -> ApiResult<Json<Page<TagWithCount>>> {
    let pagination = page.validate()?;
    let (items, total) = tags::list_with_counts(&state.db, pagination).await?;
    Ok(Json(Page::new(items, total, pagination)))
}

/// GET /tags/{id}
pub async fn get_tag(State(state): State<AppState>, Path(tag_id): Path<i64>) -> ApiResult<Json<Tag>> {
    let tag = tags::get(&state.db, tag_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tag"))?;
    Ok(Json(tag))
}

/// POST /tags
pub async fn create_tag(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(req): JsonBody<TagBody>,
) -> ApiResult<Json<Tag>> {
    let name = tag_name(&req.tag_name)?;
    ensure_name_free(&state, &name, None).await?;
    let tag = tags::create(&state.db, &name).await?;
    info!("User {} created tag '{}'", user.id(), tag.tag_name);
    Ok(Json(tag))
}

/// PUT /tags/{id}
pub async fn update_tag(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(tag_id): Path<i64>,
    JsonBody(req): JsonBody<TagBody>,
) -> ApiResult<Json<Tag>> {
    let name = tag_name(&req.tag_name)?;
    tags::get(&state.db, tag_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tag"))?;
    ensure_name_free(&state, &name, Some(tag_id)).await?;
    Ok(Json(tags::rename(&state.db, tag_id, &name).await?))
}

/// DELETE /tags/{id}
pub async fn delete_tag(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(tag_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    if !tags::delete(&state.db, tag_id).await? {
        return Err(ApiError::not_found("Tag"));
    }
    info!("Admin {} deleted tag {}", admin.id(), tag_id);
    Ok(Json(MessageResponse::new("Tag deleted")))
}

/// Build tag routes
pub fn tag_routes() -> Router<AppState> {
    Router::new()
        .route("/tags", get(list_tags).post(create_tag))
        .route("/tags/with-document-count", get(list_with_counts))
        .route("/tags/:id", get(get_tag).put(update_tag).delete(delete_tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_name_is_trimmed() {
        assert_eq!(tag_name("  exam ").unwrap(), "exam");
        assert!(tag_name("   ").is_err());
    }
}

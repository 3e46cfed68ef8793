//! Document ratings

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use udulib_common::models::Rating;

use crate::api::documents::{ensure_visible, load_document};
use crate::api::MessageResponse;
use crate::auth::CurrentUser;
use crate::db::ratings;
use crate::error::{ApiError, ApiResult, JsonBody, QueryParams};
use crate::pagination::{Page, PageParams};
use crate::AppState;

/// Highest accepted score; 0 records a rating without a score
pub const MAX_SCORE: i64 = 5;

#[derive(Debug, Deserialize)]
pub struct RatingQuery {
    pub document_id: Option<i64>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RateDocument {
    pub document_id: i64,
    pub score: i64,
}

#[derive(Debug, Deserialize)]
pub struct ScoreUpdate {
    pub score: i64,
}

fn validate_score(score: i64) -> ApiResult<i64> {
    if !(0..=MAX_SCORE).contains(&score) {
        return Err(ApiError::BadRequest(format!("score must be between 0 and {}", MAX_SCORE)));
    }
    Ok(score)
}

async fn load_rating(state: &AppState, rating_id: i64) -> ApiResult<Rating> {
    ratings::get(&state.db, rating_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Rating"))
}

/// GET /ratings
pub async fn list_ratings(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<RatingQuery>,
) -> ApiResult<Json<Page<Rating>>> {
    let pagination = page.validate()?;
    let (items, total) = ratings::list(&state.db, query.document_id, query.user_id, pagination).await?;
    Ok(Json(Page::new(items, total, pagination)))
}

/// POST /ratings
pub async fn rate_document(
    State(state): State<AppState>,
    viewer: CurrentUser,
    JsonBody(req): JsonBody<RateDocument>,
) -> ApiResult<Json<Rating>> {
    let score = validate_score(req.score)?;
    let document = load_document(&state, req.document_id).await?;
    ensure_visible(&document, &viewer)?;
    Ok(Json(ratings::upsert(&state.db, document.document_id, viewer.id(), score).await?))
}

/// GET /ratings/{id}
pub async fn get_rating(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    Path(rating_id): Path<i64>,
) -> ApiResult<Json<Rating>> {
    Ok(Json(load_rating(&state, rating_id).await?))
}

/// PUT /ratings/{id}
pub async fn update_rating(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(rating_id): Path<i64>,
    JsonBody(req): JsonBody<ScoreUpdate>,
) -> ApiResult<Json<Rating>> {
    let score = validate_score(req.score)?;
    let rating = load_rating(&state, rating_id).await?;
    viewer.ensure_owner(rating.user_id)?;
    Ok(Json(ratings::set_score(&state.db, rating_id, score).await?))
}

/// DELETE /ratings/{id}
pub async fn delete_rating(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(rating_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let rating = load_rating(&state, rating_id).await?;
    viewer.ensure_can_manage(rating.user_id)?;
    ratings::delete(&state.db, rating_id).await?;
    Ok(Json(MessageResponse::new("Rating deleted")))
}

/// Build rating routes
pub fn rating_routes() -> Router<AppState> {
    Router::new()
        .route("/ratings", get(list_ratings).post(rate_document))
        .route("/ratings/:id", get(get_rating).put(update_rating).delete(delete_rating))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_score() {
        assert_eq!(validate_score(0).unwrap(), 0);
        assert_eq!(validate_score(5).unwrap(), 5);
        assert!(validate_score(6).is_err());
        assert!(validate_score(-1).is_err());
    }
}

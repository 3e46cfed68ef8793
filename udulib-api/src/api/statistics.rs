//! Reporting endpoints
//!
//! All routes require a signed-in user; storage usage is admin-only.

use axum::{extract::State, routing::get, Json, Router};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::auth::{AdminUser, CurrentUser};
use crate::db::statistics::{
    self, ActiveUser, ContentQuality, EngagementTrend, FileTypeCount, ForumActivity, MajorDocumentCount,
    Overview, RatedDocument, ScoreCount, StorageUsage, SubjectDocumentCount, SubjectPerformance, TopDocument,
};
use crate::error::{ApiError, ApiResult, QueryParams};
use crate::AppState;

const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 100;
const DEFAULT_DAYS: i64 = 30;
const MAX_DAYS: i64 = 365;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

impl LimitQuery {
    fn resolve(&self) -> ApiResult<i64> {
        bounded("limit", self.limit, DEFAULT_LIMIT, MAX_LIMIT)
    }
}

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    pub days: Option<i64>,
}

impl DaysQuery {
    fn resolve(&self) -> ApiResult<i64> {
        bounded("days", self.days, DEFAULT_DAYS, MAX_DAYS)
    }
}

fn bounded(name: &str, value: Option<i64>, default: i64, max: i64) -> ApiResult<i64> {
    let value = value.unwrap_or(default);
    if !(1..=max).contains(&value) {
        return Err(ApiError::BadRequest(format!("{} must be between 1 and {}", name, max)));
    }
    Ok(value)
}

/// GET /statistics/overview
pub async fn overview(State(state): State<AppState>, _viewer: CurrentUser) -> ApiResult<Json<Overview>> {
    Ok(Json(statistics::overview(&state.db).await?))
}

/// GET /statistics/documents/by-status
pub async fn documents_by_status(
    State(state): State<AppState>,
    _viewer: CurrentUser,
) -> ApiResult<Json<BTreeMap<String, i64>>> {
    Ok(Json(statistics::documents_by_status(&state.db).await?))
}

/// GET /statistics/documents/by-subject
pub async fn documents_by_subject(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    QueryParams(query): QueryParams<LimitQuery>,
) -> ApiResult<Json<Vec<SubjectDocumentCount>>> {
    Ok(Json(statistics::documents_by_subject(&state.db, query.resolve()?).await?))
}

/// GET /statistics/documents/by-major
pub async fn documents_by_major(
    State(state): State<AppState>,
    _viewer: CurrentUser,
) -> ApiResult<Json<Vec<MajorDocumentCount>>> {
    Ok(Json(statistics::documents_by_major(&state.db).await?))
}

/// GET /statistics/documents/by-file-type
pub async fn documents_by_file_type(
    State(state): State<AppState>,
    _viewer: CurrentUser,
) -> ApiResult<Json<Vec<FileTypeCount>>> {
    Ok(Json(statistics::documents_by_file_type(&state.db).await?))
}

/// GET /statistics/documents/most-viewed
pub async fn most_viewed(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    QueryParams(query): QueryParams<LimitQuery>,
) -> ApiResult<Json<Vec<TopDocument>>> {
    Ok(Json(statistics::most_viewed(&state.db, query.resolve()?).await?))
}

/// GET /statistics/documents/most-downloaded
pub async fn most_downloaded(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    QueryParams(query): QueryParams<LimitQuery>,
) -> ApiResult<Json<Vec<TopDocument>>> {
    Ok(Json(statistics::most_downloaded(&state.db, query.resolve()?).await?))
}

/// GET /statistics/documents/highest-rated
pub async fn highest_rated(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    QueryParams(query): QueryParams<LimitQuery>,
) -> ApiResult<Json<Vec<RatedDocument>>> {
    Ok(Json(statistics::highest_rated(&state.db, query.resolve()?).await?))
}

/// GET /statistics/users/most-active
pub async fn most_active_users(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    QueryParams(query): QueryParams<LimitQuery>,
) -> ApiResult<Json<Vec<ActiveUser>>> {
    Ok(Json(statistics::most_active_users(&state.db, query.resolve()?).await?))
}

/// GET /statistics/activity/by-time
pub async fn activity_by_time(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    QueryParams(query): QueryParams<DaysQuery>,
) -> ApiResult<Json<BTreeMap<String, BTreeMap<String, i64>>>> {
    Ok(Json(statistics::activity_by_time(&state.db, query.resolve()?).await?))
}

/// GET /statistics/storage/usage
pub async fn storage_usage(State(state): State<AppState>, _admin: AdminUser) -> ApiResult<Json<StorageUsage>> {
    Ok(Json(statistics::storage_usage(&state.db).await?))
}

/// GET /statistics/engagement/rating-distribution
pub async fn rating_distribution(
    State(state): State<AppState>,
    _viewer: CurrentUser,
) -> ApiResult<Json<Vec<ScoreCount>>> {
    Ok(Json(statistics::rating_distribution(&state.db).await?))
}

/// GET /statistics/forum/activity
pub async fn forum_activity(State(state): State<AppState>, _viewer: CurrentUser) -> ApiResult<Json<ForumActivity>> {
    Ok(Json(statistics::forum_activity(&state.db).await?))
}

/// GET /statistics/trends/document-engagement
pub async fn engagement_trends(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    QueryParams(query): QueryParams<DaysQuery>,
) -> ApiResult<Json<Vec<EngagementTrend>>> {
    Ok(Json(statistics::engagement_trends(&state.db, query.resolve()?).await?))
}

/// GET /statistics/subjects/performance
pub async fn subject_performance(
    State(state): State<AppState>,
    _viewer: CurrentUser,
    QueryParams(query): QueryParams<LimitQuery>,
) -> ApiResult<Json<Vec<SubjectPerformance>>> {
    Ok(Json(statistics::subject_performance(&state.db, query.resolve()?).await?))
}

/// GET /statistics/quality/content-analysis
pub async fn content_quality(
    State(state): State<AppState>,
    _viewer: CurrentUser,
) -> ApiResult<Json<Vec<ContentQuality>>> {
    Ok(Json(statistics::content_quality(&state.db).await?))
}

/// Build statistics routes
pub fn statistics_routes() -> Router<AppState> {
    Router::new()
        .route("/statistics/overview", get(overview))
        .route("/statistics/documents/by-status", get(documents_by_status))
        .route("/statistics/documents/by-subject", get(documents_by_subject))
        .route("/statistics/documents/by-major", get(documents_by_major))
        .route("/statistics/documents/by-file-type", get(documents_by_file_type))
        .route("/statistics/documents/most-viewed", get(most_viewed))
        .route("/statistics/documents/most-downloaded", get(most_downloaded))
        .route("/statistics/documents/highest-rated", get(highest_rated))
        .route("/statistics/users/most-active", get(most_active_users))
        .route("/statistics/activity/by-time", get(activity_by_time))
        .route("/statistics/storage/usage", get(storage_usage))
        .route("/statistics/engagement/rating-distribution", get(rating_distribution))
        .route("/statistics/forum/activity", get(forum_activity))
        .route("/statistics/trends/document-engagement", get(engagement_trends))
        .route("/statistics/subjects/performance", get(subject_performance))
        .route("/statistics/quality/content-analysis", get(content_quality))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_defaults_and_bounds() {
        assert_eq!(LimitQuery { limit: None }.resolve().unwrap(), DEFAULT_LIMIT);
        assert_eq!(LimitQuery { limit: Some(100) }.resolve().unwrap(), 100);
        assert!(LimitQuery { limit: Some(0) }.resolve().is_err());
        assert!(LimitQuery { limit: Some(101) }.resolve().is_err());
    }

    #[test]
    fn test_days_bounds() {
        assert_eq!(DaysQuery { days: None }.resolve().unwrap(), DEFAULT_DAYS);
        assert!(DaysQuery { days: Some(366) }.resolve().is_err());
    }
}

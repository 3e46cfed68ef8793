//! Academic year endpoints

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;
use udulib_common::models::AcademicYear;

use crate::api::MessageResponse;
use crate::auth::AdminUser;
use crate::db::academic_years::{self, YearWithSubjectCount};
use crate::error::{ApiError, ApiResult, JsonBody, QueryParams};
use crate::pagination::{Page, PageParams};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateYear {
    pub year_name: String,
    pub year_order: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateYear {
    pub year_name: Option<String>,
    pub year_order: Option<i64>,
}

async fn load_year(state: &AppState, year_id: i64) -> ApiResult<AcademicYear> {
    academic_years::get(&state.db, year_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Academic year"))
}

fn year_name(raw: &str) -> ApiResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("year_name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

/// GET /academic-years
pub async fn list_years(
    State(state): State<AppState>,
    QueryParams(page): QueryParams<PageParams>,
) -> ApiResult<Json<Page<AcademicYear>>> {
    let pagination = page.validate()?;
    let (items, total) = academic_years::list(&state.db, pagination).await?;
    Ok(Json(Page::new(items, total, pagination)))
}

/// GET /academic-years/latest
pub async fn latest_year(State(state): State<AppState>) -> ApiResult<Json<AcademicYear>> {
    let year = academic_years::latest(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Academic year"))?;
    Ok(Json(year))
}

/// GET /academic-years/with-subjects-count
pub async fn list_with_subject_counts(
    State(state): State<AppState>,
    QueryParams(page): QueryParams<PageParams>,
) -> ApiResult<Json<Page<YearWithSubjectCount>>> {
    let pagination = page.validate()?;
    let (items, total) = academic_years::list_with_subject_counts(&state.db, pagination).await?;
    Ok(Json(Page::new(items, total, pagination)))
}

/// GET /academic-years/{id}
pub async fn get_year(State(state): State<AppState>, Path(year_id): Path<i64>) -> ApiResult<Json<AcademicYear>> {
    Ok(Json(load_year(&state, year_id).await?))
}

/// POST /academic-years
pub async fn create_year(
    State(state): State<AppState>,
    admin: AdminUser,
    JsonBody(req): JsonBody<CreateYear>,
) -> ApiResult<Json<AcademicYear>> {
    let year = academic_years::create(&state.db, &year_name(&req.year_name)?, req.year_order).await?;
    info!("Admin {} created academic year {}", admin.id(), year.year_name);
    Ok(Json(year))
}

/// PUT /academic-years/{id}
pub async fn update_year(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(year_id): Path<i64>,
    JsonBody(req): JsonBody<UpdateYear>,
) -> ApiResult<Json<AcademicYear>> {
    load_year(&state, year_id).await?;
    let name = req.year_name.as_deref().map(year_name).transpose()?;
    Ok(Json(academic_years::update(&state.db, year_id, name, req.year_order).await?))
}

/// DELETE /academic-years/{id}
pub async fn delete_year(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(year_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    load_year(&state, year_id).await?;
    if academic_years::subject_count(&state.db, year_id).await? > 0 {
        return Err(ApiError::BadRequest(
            "Cannot delete an academic year that still has subjects".to_string(),
        ));
    }
    academic_years::delete(&state.db, year_id).await?;
    info!("Admin {} deleted academic year {}", admin.id(), year_id);
    Ok(Json(MessageResponse::new("Academic year deleted")))
}

/// Build academic year routes
pub fn academic_year_routes() -> Router<AppState> {
    Router::new()
        .route("/academic-years", get(list_years).post(create_year))
        .route("/academic-years/latest", get(latest_year))
        .route("/academic-years/with-subjects-count", get(list_with_subject_counts))
        .route("/academic-years/:id", get(get_year).put(update_year).delete(delete_year))
}

//! Subject endpoints

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use udulib_common::models::Subject;

use crate::api::MessageResponse;
use crate::auth::AdminUser;
use crate::db::subjects::{self, NewSubject, SubjectChanges, SubjectFilter};
use crate::db::{academic_years, majors};
use crate::error::{ApiError, ApiResult, JsonBody, QueryParams};
use crate::pagination::{Page, PageParams};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSubject {
    pub subject_name: String,
    pub subject_code: String,
    pub description: Option<String>,
    pub major_id: i64,
    pub year_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubject {
    pub subject_name: Option<String>,
    pub subject_code: Option<String>,
    pub description: Option<String>,
    pub major_id: Option<i64>,
    pub year_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SubjectQuery {
    pub major_id: Option<i64>,
    pub year_id: Option<i64>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

async fn load_subject(state: &AppState, subject_id: i64) -> ApiResult<Subject> {
    subjects::get(&state.db, subject_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Subject"))
}

/// 404 unless both the major and the academic year exist
async fn ensure_parents(state: &AppState, major_id: Option<i64>, year_id: Option<i64>) -> ApiResult<()> {
    if let Some(major_id) = major_id {
        majors::get(&state.db, major_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Major"))?;
    }
    if let Some(year_id) = year_id {
        academic_years::get(&state.db, year_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Academic year"))?;
    }
    Ok(())
}

async fn ensure_code_free(state: &AppState, major_id: i64, code: &str, except: Option<i64>) -> ApiResult<()> {
    if let Some(existing) = subjects::get_by_code(&state.db, major_id, code).await? {
        if Some(existing.subject_id) != except {
            return Err(ApiError::BadRequest(format!(
                "Subject code '{}' already exists in this major",
                code
            )));
        }
    }
    Ok(())
}

/// GET /subjects
pub async fn list_subjects(
    State(state): State<AppState>,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<SubjectQuery>,
) -> ApiResult<Json<Page<Subject>>> {
    let pagination = page.validate()?;
    let filter = SubjectFilter {
        major_id: query.major_id,
        year_id: query.year_id,
        search: query.search,
    };
    let (items, total) = subjects::list(&state.db, &filter, pagination).await?;
    Ok(Json(Page::new(items, total, pagination)))
}

/// GET /subjects/count-subject
pub async fn count_subjects(State(state): State<AppState>) -> ApiResult<Json<CountResponse>> {
    let count = subjects::count(&state.db, &SubjectFilter::default()).await?;
    Ok(Json(CountResponse { count }))
}

/// GET /subjects/academic-year/{year_id}
pub async fn list_by_year(
    State(state): State<AppState>,
    Path(year_id): Path<i64>,
    QueryParams(page): QueryParams<PageParams>,
) -> ApiResult<Json<Page<Subject>>> {
    let pagination = page.validate()?;
    ensure_parents(&state, None, Some(year_id)).await?;
    let filter = SubjectFilter {
        year_id: Some(year_id),
        ..Default::default()
    };
    let (items, total) = subjects::list(&state.db, &filter, pagination).await?;
    Ok(Json(Page::new(items, total, pagination)))
}

/// GET /subjects/{id}
pub async fn get_subject(State(state): State<AppState>, Path(subject_id): Path<i64>) -> ApiResult<Json<Subject>> {
    Ok(Json(load_subject(&state, subject_id).await?))
}

/// POST /subjects
pub async fn create_subject(
    State(state): State<AppState>,
    admin: AdminUser,
    JsonBody(req): JsonBody<CreateSubject>,
) -> ApiResult<Json<Subject>> {
    let subject_name = req.subject_name.trim().to_string();
    let subject_code = req.subject_code.trim().to_string();
    if subject_name.is_empty() || subject_code.is_empty() {
        return Err(ApiError::BadRequest(
            "subject_name and subject_code must not be empty".to_string(),
        ));
    }
    ensure_parents(&state, Some(req.major_id), Some(req.year_id)).await?;
    ensure_code_free(&state, req.major_id, &subject_code, None).await?;

    let subject = subjects::create(
        &state.db,
        NewSubject {
            subject_name,
            subject_code,
            description: req.description,
            major_id: req.major_id,
            year_id: req.year_id,
        },
    )
    .await?;
    info!("Admin {} created subject {} ({})", admin.id(), subject.subject_code, subject.subject_id);
    Ok(Json(subject))
}

/// PUT /subjects/{id}
pub async fn update_subject(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(subject_id): Path<i64>,
    JsonBody(req): JsonBody<UpdateSubject>,
) -> ApiResult<Json<Subject>> {
    let current = load_subject(&state, subject_id).await?;
    ensure_parents(&state, req.major_id, req.year_id).await?;

    let subject_code = req.subject_code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
    if subject_code.is_some() || req.major_id.is_some() {
        let major_id = req.major_id.unwrap_or(current.major_id);
        let code = subject_code.as_deref().unwrap_or(&current.subject_code);
        ensure_code_free(&state, major_id, code, Some(subject_id)).await?;
    }

    let changes = SubjectChanges {
        subject_name: req.subject_name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        subject_code,
        description: req.description,
        major_id: req.major_id,
        year_id: req.year_id,
    };
    Ok(Json(subjects::update(&state.db, subject_id, changes).await?))
}

/// DELETE /subjects/{id}
pub async fn delete_subject(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(subject_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    load_subject(&state, subject_id).await?;
    if subjects::document_count(&state.db, subject_id).await? > 0 {
        return Err(ApiError::BadRequest(
            "Cannot delete a subject that still has documents".to_string(),
        ));
    }
    subjects::delete(&state.db, subject_id).await?;
    info!("Admin {} deleted subject {}", admin.id(), subject_id);
    Ok(Json(MessageResponse::new("Subject deleted")))
}

/// Build subject routes
pub fn subject_routes() -> Router<AppState> {
    Router::new()
        .route("/subjects", get(list_subjects).post(create_subject))
        .route("/subjects/count-subject", get(count_subjects))
        .route("/subjects/academic-year/:year_id", get(list_by_year))
        .route("/subjects/:id", get(get_subject).put(update_subject).delete(delete_subject))
}

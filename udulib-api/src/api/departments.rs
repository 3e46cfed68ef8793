//! Departments and their subject links

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use udulib_common::models::{Department, Subject};

use crate::api::MessageResponse;
use crate::auth::AdminUser;
use crate::db::departments::{self, slugify, DepartmentSummary};
use crate::db::subjects;
use crate::error::{ApiError, ApiResult, JsonBody, QueryParams};
use crate::pagination::{Page, PageParams};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateDepartment {
    pub name: String,
    /// Derived from `name` when omitted
    pub slug: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDepartment {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DepartmentDetail {
    #[serde(flatten)]
    pub department: Department,
    pub subjects: Vec<Subject>,
}

async fn load_department(state: &AppState, department_id: i64) -> ApiResult<Department> {
    departments::get(&state.db, department_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Department"))
}

async fn detail(state: &AppState, department: Department) -> ApiResult<DepartmentDetail> {
    let subjects = departments::subjects(&state.db, department.department_id).await?;
    Ok(DepartmentDetail { department, subjects })
}

fn clean_slug(raw: &str) -> ApiResult<String> {
    let slug = slugify(raw);
    if slug.is_empty() {
        return Err(ApiError::BadRequest("Slug must contain letters or digits".to_string()));
    }
    Ok(slug)
}

async fn ensure_slug_free(state: &AppState, slug: &str, except: Option<i64>) -> ApiResult<()> {
    if let Some(existing) = departments::get_by_slug(&state.db, slug).await? {
        if Some(existing.department_id) != except {
            return Err(ApiError::BadRequest(format!("Department slug '{}' already exists", slug)));
        }
    }
    Ok(())
}

/// GET /departments
pub async fn list_departments(
    State(state): State<AppState>,
    QueryParams(page): QueryParams<PageParams>,
) -> ApiResult<Json<Page<DepartmentSummary>>> {
    let pagination = page.validate()?;
    let (items, total) = departments::list(&state.db, pagination).await?;
    Ok(Json(Page::new(items, total, pagination)))
}

/// GET /departments/{id}
pub async fn get_department(
    State(state): State<AppState>,
    Path(department_id): Path<i64>,
) -> ApiResult<Json<DepartmentDetail>> {
    let department = load_department(&state, department_id).await?;
    Ok(Json(detail(&state, department).await?))
}

/// GET /departments/slug/{slug}
pub async fn get_department_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<DepartmentDetail>> {
    let department = departments::get_by_slug(&state.db, &slug)
        .await?
        .ok_or_else(|| ApiError::not_found("Department"))?;
    Ok(Json(detail(&state, department).await?))
}

/// POST /departments
pub async fn create_department(
    State(state): State<AppState>,
    admin: AdminUser,
    JsonBody(req): JsonBody<CreateDepartment>,
) -> ApiResult<Json<Department>> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    let slug = clean_slug(req.slug.as_deref().unwrap_or(name))?;
    ensure_slug_free(&state, &slug, None).await?;

    let department = departments::create(&state.db, name, &slug, req.description.as_deref()).await?;
    info!("Admin {} created department {}", admin.id(), department.slug);
    Ok(Json(department))
}

/// PUT /departments/{id}
pub async fn update_department(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(department_id): Path<i64>,
    JsonBody(req): JsonBody<UpdateDepartment>,
) -> ApiResult<Json<Department>> {
    load_department(&state, department_id).await?;
    let slug = req.slug.as_deref().map(clean_slug).transpose()?;
    if let Some(slug) = &slug {
        ensure_slug_free(&state, slug, Some(department_id)).await?;
    }
    let name = req.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    let updated = departments::update(&state.db, department_id, name, slug, req.description).await?;
    Ok(Json(updated))
}

/// DELETE /departments/{id}
pub async fn delete_department(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(department_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    if !departments::delete(&state.db, department_id).await? {
        return Err(ApiError::not_found("Department"));
    }
    info!("Admin {} deleted department {}", admin.id(), department_id);
    Ok(Json(MessageResponse::new("Department deleted")))
}

/// POST /departments/{id}/subjects/{subject_id}
pub async fn link_subject(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path((department_id, subject_id)): Path<(i64, i64)>,
) -> ApiResult<Json<DepartmentDetail>> {
    let department = load_department(&state, department_id).await?;
    subjects::get(&state.db, subject_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Subject"))?;
    departments::link_subject(&state.db, department_id, subject_id).await?;
    Ok(Json(detail(&state, department).await?))
}

/// DELETE /departments/{id}/subjects/{subject_id}
pub async fn unlink_subject(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path((department_id, subject_id)): Path<(i64, i64)>,
) -> ApiResult<Json<DepartmentDetail>> {
    let department = load_department(&state, department_id).await?;
    if !departments::unlink_subject(&state.db, department_id, subject_id).await? {
        return Err(ApiError::NotFound("Subject is not linked to this department".to_string()));
    }
    Ok(Json(detail(&state, department).await?))
}

/// Build department routes
pub fn department_routes() -> Router<AppState> {
    Router::new()
        .route("/departments", get(list_departments).post(create_department))
        .route("/departments/slug/:slug", get(get_department_by_slug))
        .route(
            "/departments/:id",
            get(get_department).put(update_department).delete(delete_department),
        )
        .route(
            "/departments/:id/subjects/:subject_id",
            post(link_subject).delete(unlink_subject),
        )
}

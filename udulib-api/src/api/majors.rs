//! Major catalogue and major images

use axum::{
    extract::{Multipart, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use udulib_common::models::Major;

use crate::api::upload::{ensure_image, UploadForm, MAX_IMAGE_BYTES};
use crate::api::users::public_image_url;
use crate::api::MessageResponse;
use crate::auth::AdminUser;
use crate::db::majors::{self, MajorChanges, MajorFields};
use crate::error::{ApiError, ApiResult, JsonBody, QueryParams};
use crate::pagination::{Page, PageParams};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateMajor {
    pub major_name: String,
    pub major_code: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMajor {
    pub major_name: Option<String>,
    pub major_code: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub major_id: i64,
    pub image_url: String,
}

fn required(value: &str, field: &str) -> ApiResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(value.to_string())
}

async fn load_major(state: &AppState, major_id: i64) -> ApiResult<Major> {
    majors::get(&state.db, major_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Major"))
}

async fn ensure_code_free(state: &AppState, code: &str, except: Option<i64>) -> ApiResult<()> {
    if let Some(existing) = majors::get_by_code(&state.db, code).await? {
        if Some(existing.major_id) != except {
            return Err(ApiError::BadRequest(format!("Major code '{}' already exists", code)));
        }
    }
    Ok(())
}

/// GET /majors
pub async fn list_majors(
    State(state): State<AppState>,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<SearchQuery>,
) -> ApiResult<Json<Page<Major>>> {
    let pagination = page.validate()?;
    let (items, total) = majors::list(&state.db, query.search.as_deref(), pagination).await?;
    Ok(Json(Page::new(items, total, pagination)))
}

/// GET /majors/count-major
pub async fn count_majors(State(state): State<AppState>) -> ApiResult<Json<CountResponse>> {
    let count = majors::count(&state.db, None).await?;
    Ok(Json(CountResponse { count }))
}

/// GET /majors/{id}
pub async fn get_major(State(state): State<AppState>, Path(major_id): Path<i64>) -> ApiResult<Json<Major>> {
    Ok(Json(load_major(&state, major_id).await?))
}

/// GET /majors/code/{code}
pub async fn get_major_by_code(State(state): State<AppState>, Path(code): Path<String>) -> ApiResult<Json<Major>> {
    let major = majors::get_by_code(&state.db, &code)
        .await?
        .ok_or_else(|| ApiError::not_found("Major"))?;
    Ok(Json(major))
}

/// POST /majors
pub async fn create_major(
    State(state): State<AppState>,
    admin: AdminUser,
    JsonBody(req): JsonBody<CreateMajor>,
) -> ApiResult<Json<Major>> {
    let major_code = required(&req.major_code, "major_code")?;
    ensure_code_free(&state, &major_code, None).await?;
    let major = majors::create(
        &state.db,
        MajorFields {
            major_name: required(&req.major_name, "major_name")?,
            major_code,
            description: req.description,
        },
    )
    .await?;
    info!("Admin {} created major {} ({})", admin.id(), major.major_code, major.major_id);
    Ok(Json(major))
}

/// PUT /majors/{id}
pub async fn update_major(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(major_id): Path<i64>,
    JsonBody(req): JsonBody<UpdateMajor>,
) -> ApiResult<Json<Major>> {
    load_major(&state, major_id).await?;
    let major_code = req.major_code.as_deref().map(|c| required(c, "major_code")).transpose()?;
    if let Some(code) = &major_code {
        ensure_code_free(&state, code, Some(major_id)).await?;
    }
    let changes = MajorChanges {
        major_name: req.major_name.as_deref().map(|n| required(n, "major_name")).transpose()?,
        major_code,
        description: req.description,
    };
    Ok(Json(majors::update(&state.db, major_id, changes).await?))
}

/// DELETE /majors/{id}
pub async fn delete_major(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(major_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let major = load_major(&state, major_id).await?;
    if majors::subject_count(&state.db, major_id).await? > 0 {
        return Err(ApiError::BadRequest(
            "Cannot delete a major that still has subjects".to_string(),
        ));
    }
    majors::delete(&state.db, major_id).await?;
    if let Some(image) = major.image_url {
        state.storage.delete_quietly(&image).await;
    }
    info!("Admin {} deleted major {}", admin.id(), major_id);
    Ok(Json(MessageResponse::new("Major deleted")))
}

/// POST /majors/{id}/image
pub async fn upload_image(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(major_id): Path<i64>,
    multipart: Multipart,
) -> ApiResult<Json<Major>> {
    let major = load_major(&state, major_id).await?;
    let mut form = UploadForm::read(multipart, "file", MAX_IMAGE_BYTES).await?;
    let file = form.require_file()?;
    ensure_image(&file)?;

    let bucket = state.storage.buckets().major_images.clone();
    let prefix = format!("major_{}", major_id);
    let reference = state
        .storage
        .upload(&bucket, file.data, &file.filename, Some(&prefix))
        .await?;
    let updated = majors::set_image(&state.db, major_id, Some(&reference)).await?;
    if let Some(previous) = major.image_url {
        state.storage.delete_quietly(&previous).await;
    }
    Ok(Json(updated))
}

/// GET /majors/{id}/image
pub async fn get_image(State(state): State<AppState>, Path(major_id): Path<i64>) -> ApiResult<Json<ImageResponse>> {
    let major = load_major(&state, major_id).await?;
    let reference = major.image_url.ok_or_else(|| ApiError::not_found("Major image"))?;
    Ok(Json(ImageResponse {
        major_id,
        image_url: public_image_url(&state, &reference)?,
    }))
}

/// DELETE /majors/{id}/image
pub async fn delete_image(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(major_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let major = load_major(&state, major_id).await?;
    let reference = major.image_url.ok_or_else(|| ApiError::not_found("Major image"))?;
    majors::set_image(&state.db, major_id, None).await?;
    state.storage.delete_quietly(&reference).await;
    Ok(Json(MessageResponse::new("Major image deleted")))
}

/// Build major routes
pub fn major_routes() -> Router<AppState> {
    Router::new()
        .route("/majors", get(list_majors).post(create_major))
        .route("/majors/count-major", get(count_majors))
        .route("/majors/code/:code", get(get_major_by_code))
        .route("/majors/:id", get(get_major).put(update_major).delete(delete_major))
        .route("/majors/:id/image", post(upload_image).get(get_image).delete(delete_image))
}

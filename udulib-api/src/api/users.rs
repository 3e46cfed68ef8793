//! Account self-service and user administration

use axum::{
    extract::{Multipart, Path, State},
    routing::{get, patch, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use udulib_common::models::{User, UserRole, UserStatus};
use udulib_common::security;

use crate::api::auth::{ensure_identity_free, hash_password, validate_email, validate_username};
use crate::api::upload::{ensure_image, UploadForm, MAX_IMAGE_BYTES};
use crate::api::MessageResponse;
use crate::auth::{AdminUser, CurrentUser};
use crate::db::documents;
use crate::db::users::{self, UserChanges, UserFilter};
use crate::error::{ApiError, ApiResult, JsonBody, QueryParams};
use crate::pagination::{Page, PageParams};
use crate::storage::StorageError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateMe {
    pub email: Option<String>,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub university_id: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminUpdateUser {
    pub email: Option<String>,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub university_id: Option<String>,
    pub password: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: UserStatus,
}

#[derive(Debug, Deserialize)]
pub struct PrivacyUpdate {
    pub is_private: bool,
}

#[derive(Debug, Deserialize)]
pub struct BulkDeactivate {
    pub user_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct BulkDeactivateResponse {
    pub deactivated: u64,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub search: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub avatar_url: String,
}

#[derive(Debug, Serialize)]
pub struct PublicProfile {
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    pub role: UserRole,
    pub avatar_url: Option<String>,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub documents_count: i64,
}

/// Browser-usable URL for a stored image reference
///
/// References outside object storage (for example a Google profile
/// picture) are returned unchanged.
pub(crate) fn public_image_url(state: &AppState, reference: &str) -> ApiResult<String> {
    match state.storage.presigned_url(reference) {
        Ok(url) => Ok(url),
        Err(StorageError::InvalidReference(_)) => Ok(reference.to_string()),
        Err(e) => Err(e.into()),
    }
}

/// 400 when `user` is the only active administrator
async fn ensure_not_last_admin(state: &AppState, user: &User) -> ApiResult<()> {
    if user.is_admin() && user.is_active() && users::count_active_admins(&state.db).await? <= 1 {
        return Err(ApiError::BadRequest(
            "Cannot remove or deactivate the last active administrator".to_string(),
        ));
    }
    Ok(())
}

async fn load_user(state: &AppState, user_id: i64) -> ApiResult<User> {
    users::get_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))
}

/// Validate identity fields and hash a new password into `UserChanges`
async fn build_changes(
    state: &AppState,
    user_id: i64,
    email: Option<String>,
    username: Option<String>,
    password: Option<String>,
) -> ApiResult<UserChanges> {
    let email = email.map(|e| e.trim().to_string());
    let username = username.map(|u| u.trim().to_string());
    if let Some(email) = &email {
        validate_email(email)?;
    }
    if let Some(username) = &username {
        validate_username(username)?;
    }
    ensure_identity_free(state, email.as_deref(), username.as_deref(), Some(user_id)).await?;

    let password_hash = match password {
        Some(password) => {
            security::validate_password(&password)?;
            Some(hash_password(state, password).await?)
        }
        None => None,
    };
    Ok(UserChanges {
        email,
        username,
        password_hash,
        ..Default::default()
    })
}

/// GET /users/me
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

/// PUT /users/me
pub async fn update_me(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(req): JsonBody<UpdateMe>,
) -> ApiResult<Json<User>> {
    let mut changes = build_changes(&state, user.id(), req.email, req.username, req.password).await?;
    changes.full_name = req.full_name;
    changes.phone_number = req.phone_number;
    changes.university_id = req.university_id;

    let updated = users::update(&state.db, user.id(), changes).await?;
    info!("User {} updated their profile", updated.user_id);
    Ok(Json(updated))
}

/// PUT /users/me/privacy
pub async fn set_privacy(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(req): JsonBody<PrivacyUpdate>,
) -> ApiResult<Json<User>> {
    Ok(Json(users::set_privacy(&state.db, user.id(), req.is_private).await?))
}

/// POST /users/me/privacy/toggle
pub async fn toggle_privacy(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Json<User>> {
    Ok(Json(users::set_privacy(&state.db, user.user_id, !user.is_private).await?))
}

/// POST /users/me/avatar
pub async fn upload_avatar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> ApiResult<Json<User>> {
    let mut form = UploadForm::read(multipart, "file", MAX_IMAGE_BYTES).await?;
    let file = form.require_file()?;
    ensure_image(&file)?;

    let bucket = state.storage.buckets().avatars.clone();
    let prefix = format!("avatar_{}", user.user_id);
    let reference = state
        .storage
        .upload(&bucket, file.data, &file.filename, Some(&prefix))
        .await?;

    let updated = users::set_avatar(&state.db, user.user_id, Some(&reference)).await?;
    if let Some(previous) = user.avatar_url {
        state.storage.delete_quietly(&previous).await;
    }
    info!("User {} uploaded avatar {}", user.user_id, reference);
    Ok(Json(updated))
}

/// GET /users/me/avatar
pub async fn get_avatar(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Json<AvatarResponse>> {
    let reference = user.avatar_url.ok_or_else(|| ApiError::not_found("Avatar"))?;
    Ok(Json(AvatarResponse {
        avatar_url: public_image_url(&state, &reference)?,
    }))
}

/// DELETE /users/me/avatar
pub async fn delete_avatar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<MessageResponse>> {
    let reference = user.avatar_url.ok_or_else(|| ApiError::not_found("Avatar"))?;
    users::set_avatar(&state.db, user.user_id, None).await?;
    state.storage.delete_quietly(&reference).await;
    Ok(Json(MessageResponse::new("Avatar deleted")))
}

/// GET /users/{id}/profile
pub async fn get_profile(
    State(state): State<AppState>,
    viewer: Option<CurrentUser>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<PublicProfile>> {
    let user = load_user(&state, user_id).await?;
    if user.is_private && !viewer.as_ref().is_some_and(|v| v.can_manage(user.user_id)) {
        return Err(ApiError::Forbidden("This profile is private".to_string()));
    }

    let documents_count = documents::count_approved_by_user(&state.db, user.user_id).await?;
    let avatar_url = match &user.avatar_url {
        Some(reference) => Some(public_image_url(&state, reference)?),
        None => None,
    };

    Ok(Json(PublicProfile {
        user_id: user.user_id,
        username: user.username,
        full_name: user.full_name,
        role: user.role,
        avatar_url,
        is_private: user.is_private,
        created_at: user.created_at,
        documents_count,
    }))
}

/// GET /users
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<UserQuery>,
) -> ApiResult<Json<Page<User>>> {
    let pagination = page.validate()?;
    let filter = UserFilter {
        search: query.search,
        role: query.role,
        status: query.status,
    };
    let (items, total) = users::list(&state.db, &filter, pagination).await?;
    Ok(Json(Page::new(items, total, pagination)))
}

/// GET /users/count
pub async fn count_users(State(state): State<AppState>, _admin: AdminUser) -> ApiResult<Json<CountResponse>> {
    let count = users::count(&state.db, &UserFilter::default()).await?;
    Ok(Json(CountResponse { count }))
}

/// GET /users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<User>> {
    Ok(Json(load_user(&state, user_id).await?))
}

/// PUT /users/{id}
pub async fn update_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(user_id): Path<i64>,
    JsonBody(req): JsonBody<AdminUpdateUser>,
) -> ApiResult<Json<User>> {
    let target = load_user(&state, user_id).await?;
    let demotes = req.role.is_some_and(|r| r != UserRole::Admin);
    let deactivates = req.status.is_some_and(|s| s != UserStatus::Active);
    if demotes || deactivates {
        ensure_not_last_admin(&state, &target).await?;
    }

    let mut changes = build_changes(&state, user_id, req.email, req.username, req.password).await?;
    changes.full_name = req.full_name;
    changes.phone_number = req.phone_number;
    changes.university_id = req.university_id;
    changes.role = req.role;
    changes.status = req.status;

    let updated = users::update(&state.db, user_id, changes).await?;
    info!("Admin {} updated user {}", admin.id(), user_id);
    Ok(Json(updated))
}

/// PATCH /users/{id}/status
pub async fn update_status(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(user_id): Path<i64>,
    JsonBody(req): JsonBody<StatusUpdate>,
) -> ApiResult<Json<User>> {
    let target = load_user(&state, user_id).await?;
    if req.status != UserStatus::Active {
        ensure_not_last_admin(&state, &target).await?;
    }
    let changes = UserChanges {
        status: Some(req.status),
        ..Default::default()
    };
    let updated = users::update(&state.db, user_id, changes).await?;
    info!("Admin {} set user {} status to {}", admin.id(), user_id, req.status);
    Ok(Json(updated))
}

/// DELETE /users/{id}
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let target = load_user(&state, user_id).await?;
    ensure_not_last_admin(&state, &target).await?;

    let blobs = users::owned_file_paths(&state.db, user_id).await?;
    users::delete(&state.db, user_id).await?;
    for reference in blobs {
        state.storage.delete_quietly(&reference).await;
    }
    info!("Admin {} deleted user {}", admin.id(), user_id);
    Ok(Json(MessageResponse::new("User deleted")))
}

/// POST /users/bulk-deactivate
pub async fn bulk_deactivate(
    State(state): State<AppState>,
    admin: AdminUser,
    JsonBody(req): JsonBody<BulkDeactivate>,
) -> ApiResult<Json<BulkDeactivateResponse>> {
    let mut user_ids = req.user_ids;
    user_ids.sort_unstable();
    user_ids.dedup();

    let mut admins_hit = 0;
    for id in &user_ids {
        if let Some(user) = users::get_by_id(&state.db, *id).await? {
            if user.is_admin() && user.is_active() {
                admins_hit += 1;
            }
        }
    }
    if admins_hit > 0 && admins_hit >= users::count_active_admins(&state.db).await? {
        return Err(ApiError::BadRequest(
            "Cannot remove or deactivate the last active administrator".to_string(),
        ));
    }

    let deactivated = users::bulk_deactivate(&state.db, &user_ids).await?;
    info!("Admin {} deactivated {} users", admin.id(), deactivated);
    Ok(Json(BulkDeactivateResponse { deactivated }))
}

/// Build user routes
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/count", get(count_users))
        .route("/users/bulk-deactivate", post(bulk_deactivate))
        .route("/users/me", get(get_me).put(update_me))
        .route("/users/me/privacy", put(set_privacy))
        .route("/users/me/privacy/toggle", post(toggle_privacy))
        .route("/users/me/avatar", get(get_avatar).post(upload_avatar).delete(delete_avatar))
        .route("/users/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/users/:id/status", patch(update_status))
        .route("/users/:id/profile", get(get_profile))
}

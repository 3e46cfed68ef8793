//! Administrator-editable runtime settings

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;
use udulib_common::models::SystemConfigEntry;

use crate::api::MessageResponse;
use crate::auth::AdminUser;
use crate::db::system_config;
use crate::error::{ApiError, ApiResult, JsonBody};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ConfigValue {
    pub value: String,
    pub description: Option<String>,
}

/// GET /system-config
pub async fn list_config(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<SystemConfigEntry>>> {
    Ok(Json(system_config::list(&state.db).await?))
}

/// GET /system-config/{key}
pub async fn get_config(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(key): Path<String>,
) -> ApiResult<Json<SystemConfigEntry>> {
    let entry = system_config::get(&state.db, &key)
        .await?
        .ok_or_else(|| ApiError::not_found("Configuration key"))?;
    Ok(Json(entry))
}

/// PUT /system-config/{key}
pub async fn put_config(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(key): Path<String>,
    JsonBody(req): JsonBody<ConfigValue>,
) -> ApiResult<Json<SystemConfigEntry>> {
    let key = key.trim();
    if key.is_empty() {
        return Err(ApiError::BadRequest("Configuration key must not be empty".to_string()));
    }
    let entry = system_config::upsert(&state.db, key, &req.value, req.description.as_deref()).await?;
    info!("Admin {} set system config {}", admin.id(), key);
    Ok(Json(entry))
}

/// DELETE /system-config/{key}
pub async fn delete_config(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(key): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    if !system_config::delete(&state.db, &key).await? {
        return Err(ApiError::not_found("Configuration key"));
    }
    info!("Admin {} removed system config {}", admin.id(), key);
    Ok(Json(MessageResponse::new("Configuration deleted")))
}

/// Build system config routes
pub fn system_config_routes() -> Router<AppState> {
    Router::new()
        .route("/system-config", get(list_config))
        .route(
            "/system-config/:key",
            get(get_config).put(put_config).delete(delete_config),
        )
}

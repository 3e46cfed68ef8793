//! User notifications

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use udulib_common::models::{Notification, UserRole};

use crate::api::MessageResponse;
use crate::auth::{AdminUser, CurrentUser};
use crate::db::notifications::{self, NewNotification};
use crate::db::users;
use crate::error::{ApiError, ApiResult, JsonBody, QueryParams};
use crate::pagination::{Page, PageParams};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub is_read: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AdminNotificationQuery {
    pub user_id: Option<i64>,
    pub is_read: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateNotification {
    pub user_id: i64,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub reference_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct Broadcast {
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    /// Everyone when absent
    pub role: Option<UserRole>,
}

#[derive(Debug, Deserialize)]
pub struct ReadUpdate {
    pub is_read: bool,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
pub struct BroadcastResult {
    pub sent: u64,
}

#[derive(Debug, Serialize)]
pub struct MarkAllResult {
    pub updated: u64,
}

/// Record a notification as a side effect; failures are logged only
pub(crate) async fn notify(state: &AppState, new: NewNotification<'_>) {
    let user_id = new.user_id;
    if let Err(e) = notifications::create(&state.db, new).await {
        warn!("Failed to create notification for user {}: {}", user_id, e);
    }
}

fn non_empty<'a>(value: &'a str, field: &str) -> ApiResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(value)
}

async fn load_notification(state: &AppState, notification_id: i64) -> ApiResult<Notification> {
    notifications::get(&state.db, notification_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Notification"))
}

/// GET /notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    user: CurrentUser,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<NotificationQuery>,
) -> ApiResult<Json<Page<Notification>>> {
    let pagination = page.validate()?;
    let (items, total) = notifications::list(&state.db, Some(user.id()), query.is_read, pagination).await?;
    Ok(Json(Page::new(items, total, pagination)))
}

/// GET /notifications/unread-count
pub async fn unread_count(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Json<UnreadCount>> {
    let unread_count = notifications::unread_count(&state.db, user.id()).await?;
    Ok(Json(UnreadCount { unread_count }))
}

/// GET /notifications/admin
pub async fn list_all_notifications(
    State(state): State<AppState>,
    _admin: AdminUser,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<AdminNotificationQuery>,
) -> ApiResult<Json<Page<Notification>>> {
    let pagination = page.validate()?;
    let (items, total) = notifications::list(&state.db, query.user_id, query.is_read, pagination).await?;
    Ok(Json(Page::new(items, total, pagination)))
}

/// POST /notifications
pub async fn create_notification(
    State(state): State<AppState>,
    admin: AdminUser,
    JsonBody(req): JsonBody<CreateNotification>,
) -> ApiResult<Json<Notification>> {
    users::get_by_id(&state.db, req.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    let notification = notifications::create(
        &state.db,
        NewNotification {
            user_id: req.user_id,
            title: non_empty(&req.title, "title")?,
            content: non_empty(&req.content, "content")?,
            notification_type: non_empty(&req.notification_type, "type")?,
            reference_id: req.reference_id,
        },
    )
    .await?;
    info!("Admin {} notified user {}", admin.id(), req.user_id);
    Ok(Json(notification))
}

/// POST /notifications/broadcast
pub async fn broadcast(
    State(state): State<AppState>,
    admin: AdminUser,
    JsonBody(req): JsonBody<Broadcast>,
) -> ApiResult<Json<BroadcastResult>> {
    let title = non_empty(&req.title, "title")?;
    let content = non_empty(&req.content, "content")?;
    let notification_type = non_empty(&req.notification_type, "type")?;

    let recipients = users::ids_by_role(&state.db, req.role).await?;
    let sent = notifications::broadcast(&state.db, &recipients, title, content, notification_type).await?;
    info!("Admin {} broadcast '{}' to {} users", admin.id(), title, sent);
    Ok(Json(BroadcastResult { sent }))
}

/// GET /notifications/{id}
pub async fn get_notification(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(notification_id): Path<i64>,
) -> ApiResult<Json<Notification>> {
    let notification = load_notification(&state, notification_id).await?;
    user.ensure_can_manage(notification.user_id)?;
    Ok(Json(notification))
}

/// PUT /notifications/{id}
pub async fn update_notification(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(notification_id): Path<i64>,
    JsonBody(req): JsonBody<ReadUpdate>,
) -> ApiResult<Json<Notification>> {
    let notification = load_notification(&state, notification_id).await?;
    user.ensure_owner(notification.user_id)?;
    Ok(Json(notifications::set_read(&state.db, notification_id, req.is_read).await?))
}

/// DELETE /notifications/{id}
pub async fn delete_notification(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(notification_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let notification = load_notification(&state, notification_id).await?;
    user.ensure_can_manage(notification.user_id)?;
    notifications::delete(&state.db, notification_id).await?;
    Ok(Json(MessageResponse::new("Notification deleted")))
}

/// POST /notifications/mark-all-read
pub async fn mark_all_read(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Json<MarkAllResult>> {
    let updated = notifications::mark_all_read(&state.db, user.id()).await?;
    Ok(Json(MarkAllResult { updated }))
}

/// Build notification routes
pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications).post(create_notification))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/admin", get(list_all_notifications))
        .route("/notifications/broadcast", post(broadcast))
        .route("/notifications/mark-all-read", post(mark_all_read))
        .route(
            "/notifications/:id",
            get(get_notification).put(update_notification).delete(delete_notification),
        )
}

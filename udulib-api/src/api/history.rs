//! Document access history

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use udulib_common::models::{DocumentHistory, HistoryAction};

use crate::api::documents::{ensure_visible, load_document};
use crate::api::MessageResponse;
use crate::auth::{AdminUser, CurrentUser};
use crate::db::history::{self, HistoryFilter};
use crate::error::{ApiError, ApiResult, JsonBody, QueryParams};
use crate::pagination::{Page, PageParams};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub document_id: Option<i64>,
    pub action: Option<HistoryAction>,
}

#[derive(Debug, Deserialize)]
pub struct RecordAccess {
    pub document_id: i64,
    pub action: HistoryAction,
}

/// GET /document-history
pub async fn list_history(
    State(state): State<AppState>,
    viewer: CurrentUser,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<HistoryQuery>,
) -> ApiResult<Json<Page<DocumentHistory>>> {
    let pagination = page.validate()?;
    let filter = HistoryFilter {
        user_id: (!viewer.is_admin()).then(|| viewer.id()),
        document_id: query.document_id,
        action: query.action,
    };
    let (items, total) = history::list(&state.db, &filter, pagination).await?;
    Ok(Json(Page::new(items, total, pagination)))
}

/// POST /document-history
pub async fn record_history(
    State(state): State<AppState>,
    viewer: CurrentUser,
    JsonBody(req): JsonBody<RecordAccess>,
) -> ApiResult<Json<DocumentHistory>> {
    let document = load_document(&state, req.document_id).await?;
    ensure_visible(&document, &viewer)?;
    Ok(Json(history::create(&state.db, document.document_id, viewer.id(), req.action).await?))
}

/// GET /document-history/{id}
pub async fn get_history(
    State(state): State<AppState>,
    viewer: CurrentUser,
    Path(history_id): Path<i64>,
) -> ApiResult<Json<DocumentHistory>> {
    let entry = history::get(&state.db, history_id)
        .await?
        .ok_or_else(|| ApiError::not_found("History entry"))?;
    viewer.ensure_can_manage(entry.user_id)?;
    Ok(Json(entry))
}

/// DELETE /document-history/{id}
pub async fn delete_history(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(history_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    if !history::delete(&state.db, history_id).await? {
        return Err(ApiError::not_found("History entry"));
    }
    Ok(Json(MessageResponse::new("History entry deleted")))
}

/// Build document history routes
pub fn history_routes() -> Router<AppState> {
    Router::new()
        .route("/document-history", get(list_history).post(record_history))
        .route("/document-history/:id", get(get_history).delete(delete_history))
}

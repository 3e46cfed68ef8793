//! Password reset by emailed one-time token

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use udulib_common::security;

use crate::api::auth::hash_password;
use crate::api::MessageResponse;
use crate::db::users;
use crate::error::{ApiError, ApiResult, JsonBody};
use crate::mail;
use crate::AppState;

/// Same reply whether or not the account exists
const NEUTRAL_MESSAGE: &str = "If the email exists in our system, a password reset link has been sent";

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmReset {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenCheck {
    pub valid: bool,
    pub email: String,
    pub message: String,
}

fn invalid_token() -> ApiError {
    ApiError::BadRequest("Invalid or expired token".to_string())
}

/// POST /password-reset/request-reset
pub async fn request_reset(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ResetRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if let Some(user) = users::get_by_email(&state.db, req.email.trim()).await? {
        // Older links for the same account stop working
        let user_id = user.user_id;
        state.reset_tokens.revoke_where(|id| *id == user_id).await;
        let token = state.reset_tokens.issue(user_id).await;

        let email = &state.settings.email;
        let mail = mail::password_reset(
            &user.email,
            &user.full_name,
            &email.frontend_url,
            &token,
            state.reset_tokens.ttl().num_minutes(),
        );
        mail::send_in_background(state.mailer.clone(), mail);
        info!("Password reset requested for user {}", user_id);
    }
    Ok(Json(MessageResponse::new(NEUTRAL_MESSAGE)))
}

/// POST /password-reset/confirm-reset
pub async fn confirm_reset(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ConfirmReset>,
) -> ApiResult<Json<MessageResponse>> {
    security::validate_password(&req.new_password)?;
    let user_id = state.reset_tokens.peek(&req.token).await.ok_or_else(invalid_token)?;
    let user = users::get_by_id(&state.db, user_id).await?.ok_or_else(invalid_token)?;

    let hash = hash_password(&state, req.new_password).await?;
    // Consumed after hashing; a hashing failure leaves the link valid
    if state.reset_tokens.consume(&req.token).await.is_none() {
        return Err(invalid_token());
    }
    users::set_password_hash(&state.db, user.user_id, &hash).await?;

    mail::send_in_background(state.mailer.clone(), mail::password_changed(&user.email, &user.full_name));
    info!("Password reset completed for user {}", user.user_id);
    Ok(Json(MessageResponse::new("Password has been reset successfully")))
}

/// GET /password-reset/verify-token/{token}
pub async fn verify_token(State(state): State<AppState>, Path(token): Path<String>) -> ApiResult<Json<TokenCheck>> {
    let user_id = state.reset_tokens.peek(&token).await.ok_or_else(invalid_token)?;
    let user = users::get_by_id(&state.db, user_id).await?.ok_or_else(invalid_token)?;
    Ok(Json(TokenCheck {
        valid: true,
        email: user.email,
        message: "Token is valid".to_string(),
    }))
}

/// Build password reset routes
pub fn password_reset_routes() -> Router<AppState> {
    Router::new()
        .route("/password-reset/request-reset", post(request_reset))
        .route("/password-reset/confirm-reset", post(confirm_reset))
        .route("/password-reset/verify-token/:token", get(verify_token))
}

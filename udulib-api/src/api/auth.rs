//! Registration, login and Google sign-in

use axum::{
    extract::State,
    http::StatusCode,
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use udulib_common::models::{User, UserRole, UserStatus};
use udulib_common::security::{self, random_token};

use crate::api::MessageResponse;
use crate::auth::CurrentUser;
use crate::db::users::{self, NewUser};
use crate::error::{ApiError, ApiResult, JsonBody, QueryParams};
use crate::oauth;
use crate::AppState;

pub const MIN_USERNAME_LEN: usize = 3;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub full_name: String,
    #[serde(default = "default_role")]
    pub role: UserRole,
    pub university_id: Option<String>,
    pub phone_number: Option<String>,
}

fn default_role() -> UserRole {
    UserRole::Student
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Seconds until the token expires
    pub expires_in: i64,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct GoogleCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// bcrypt on a blocking thread at the configured cost
pub(crate) async fn hash_password(state: &AppState, password: String) -> ApiResult<String> {
    let cost = state.settings.security.bcrypt_cost;
    let hash = tokio::task::spawn_blocking(move || security::hash_password(&password, cost))
        .await
        .map_err(|e| ApiError::Internal(format!("Password hashing task failed: {}", e)))??;
    Ok(hash)
}

pub(crate) async fn verify_password(password: String, hash: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || security::verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::Internal(format!("Password check task failed: {}", e)))
}

pub(crate) fn validate_email(email: &str) -> ApiResult<()> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.ends_with('.'));
    if valid && !email.contains(char::is_whitespace) {
        Ok(())
    } else {
        Err(ApiError::BadRequest("Invalid email address".to_string()))
    }
}

pub(crate) fn validate_username(username: &str) -> ApiResult<()> {
    if username.chars().count() < MIN_USERNAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "Username must be at least {} characters",
            MIN_USERNAME_LEN
        )));
    }
    Ok(())
}

/// 400 when another account already uses the email or username
pub(crate) async fn ensure_identity_free(
    state: &AppState,
    email: Option<&str>,
    username: Option<&str>,
    except_user: Option<i64>,
) -> ApiResult<()> {
    if let Some(email) = email {
        if let Some(existing) = users::get_by_email(&state.db, email).await? {
            if Some(existing.user_id) != except_user {
                return Err(ApiError::BadRequest("Email already registered".to_string()));
            }
        }
    }
    if let Some(username) = username {
        if let Some(existing) = users::get_by_username(&state.db, username).await? {
            if Some(existing.user_id) != except_user {
                return Err(ApiError::BadRequest("Username already taken".to_string()));
            }
        }
    }
    Ok(())
}

fn issue_token(state: &AppState, user: User) -> ApiResult<TokenResponse> {
    let issued = state.tokens.issue(user.user_id, user.role)?;
    Ok(TokenResponse {
        access_token: issued.token,
        token_type: "bearer".to_string(),
        expires_in: issued.expires_in,
        user,
    })
}

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let email = req.email.trim().to_string();
    let username = req.username.trim().to_string();
    validate_email(&email)?;
    validate_username(&username)?;
    security::validate_password(&req.password)?;
    if req.role == UserRole::Admin {
        return Err(ApiError::BadRequest("Cannot register as admin".to_string()));
    }
    ensure_identity_free(&state, Some(&email), Some(&username), None).await?;

    let password_hash = hash_password(&state, req.password).await?;
    let user = users::create(
        &state.db,
        NewUser {
            username,
            email,
            password_hash,
            full_name: req.full_name.trim().to_string(),
            role: req.role,
            status: UserStatus::Active,
            university_id: req.university_id,
            phone_number: req.phone_number,
            google_id: None,
            avatar_url: None,
        },
    )
    .await?;

    info!("Registered user {} (user_id={})", user.email, user.user_id);
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let invalid = || ApiError::Unauthorized("Incorrect email or password".to_string());

    let user = users::get_by_email(&state.db, req.email.trim())
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(req.password, user.password_hash.clone()).await? {
        return Err(invalid());
    }
    if user.status == UserStatus::Banned {
        return Err(ApiError::Forbidden("Account has been banned".to_string()));
    }

    users::set_last_login(&state.db, user.user_id).await?;
    info!("User {} logged in", user.user_id);
    Ok(Json(issue_token(&state, user)?))
}

/// POST /auth/logout
///
/// Tokens are stateless; the client discards its copy.
pub async fn logout(user: CurrentUser) -> Json<MessageResponse> {
    info!("User {} logged out", user.id());
    Json(MessageResponse::new("Successfully logged out"))
}

fn google_client(state: &AppState) -> ApiResult<std::sync::Arc<oauth::GoogleOAuth>> {
    state
        .google
        .clone()
        .ok_or_else(|| ApiError::ServiceUnavailable("Google login is not configured".to_string()))
}

/// GET /auth/google/login
pub async fn google_login(State(state): State<AppState>) -> ApiResult<Redirect> {
    let google = google_client(&state)?;
    let csrf = state.oauth_states.issue(()).await;
    let url = google.authorize_url(&csrf)?;
    Ok(Redirect::temporary(&url))
}

/// Username derived from the email local part, suffixed until free
async fn free_username(state: &AppState, email: &str) -> ApiResult<String> {
    let base: String = email
        .split('@')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        .collect();
    let base = if base.chars().count() < MIN_USERNAME_LEN {
        format!("user_{}", base)
    } else {
        base
    };

    let mut candidate = base.clone();
    let mut n = 1;
    while users::get_by_username(&state.db, &candidate).await?.is_some() {
        n += 1;
        candidate = format!("{}{}", base, n);
    }
    Ok(candidate)
}

async fn user_for_google_profile(state: &AppState, profile: oauth::GoogleProfile) -> ApiResult<User> {
    if let Some(user) = users::get_by_google_id(&state.db, &profile.sub).await? {
        return Ok(user);
    }
    if !profile.email_verified {
        return Err(ApiError::BadRequest("Google account email is not verified".to_string()));
    }
    if let Some(user) = users::get_by_email(&state.db, &profile.email).await? {
        users::link_google_id(&state.db, user.user_id, &profile.sub).await?;
        info!("Linked Google account to user {}", user.user_id);
        return Ok(user);
    }

    // Google-only accounts get an unguessable password until they reset it
    let password_hash = hash_password(state, random_token(24)).await?;
    let username = free_username(state, &profile.email).await?;
    let full_name = profile.name.clone().unwrap_or_else(|| username.clone());
    let user = users::create(
        &state.db,
        NewUser {
            username,
            email: profile.email,
            password_hash,
            full_name,
            role: UserRole::Student,
            status: UserStatus::Active,
            university_id: None,
            phone_number: None,
            google_id: Some(profile.sub),
            avatar_url: profile.picture,
        },
    )
    .await?;
    info!("Created user {} from Google sign-in", user.user_id);
    Ok(user)
}

/// GET /auth/google/callback
pub async fn google_callback(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<GoogleCallback>,
) -> ApiResult<Redirect> {
    let google = google_client(&state)?;
    if let Some(err) = params.error {
        warn!("Google sign-in returned error: {}", err);
        return Err(ApiError::BadRequest(format!("Google sign-in failed: {}", err)));
    }
    let csrf = params.state.unwrap_or_default();
    if state.oauth_states.consume(&csrf).await.is_none() {
        return Err(ApiError::BadRequest("Invalid or expired OAuth state".to_string()));
    }
    let code = params
        .code
        .ok_or_else(|| ApiError::BadRequest("Missing authorization code".to_string()))?;

    let profile = google.exchange_code(&code).await.map_err(|e| {
        error!("Google code exchange failed: {:#}", e);
        ApiError::BadRequest("Google sign-in failed".to_string())
    })?;

    let user = user_for_google_profile(&state, profile).await?;
    if user.status == UserStatus::Banned {
        return Err(ApiError::Forbidden("Account has been banned".to_string()));
    }
    users::set_last_login(&state.db, user.user_id).await?;

    let token = issue_token(&state, user)?;
    let target = oauth::frontend_redirect(&state.settings.oauth.google.frontend_redirect, &token.access_token)?;
    Ok(Redirect::temporary(&target))
}

/// Build authentication routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/google/login", get(google_login))
        .route("/auth/google/callback", get(google_callback))
}

//! Bearer-token authentication extractors
//!
//! [`CurrentUser`] resolves `Authorization: Bearer <jwt>` to an active user
//! row. [`AdminUser`] additionally requires the admin role. Handlers that
//! serve both anonymous and signed-in callers take `Option<CurrentUser>`.

use axum::{async_trait, extract::FromRequestParts, http::header, http::request::Parts};
use tracing::debug;
use udulib_common::models::{User, UserStatus};

use crate::db;
use crate::error::ApiError;
use crate::AppState;

/// Authenticated, non-banned user
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Authenticated administrator
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl CurrentUser {
    pub fn id(&self) -> i64 {
        self.0.user_id
    }

    pub fn is_admin(&self) -> bool {
        self.0.is_admin()
    }

    /// Owner of a resource or an administrator
    pub fn can_manage(&self, owner_id: i64) -> bool {
        self.0.user_id == owner_id || self.0.is_admin()
    }

    pub fn ensure_can_manage(&self, owner_id: i64) -> Result<(), ApiError> {
        if self.can_manage(owner_id) {
            Ok(())
        } else {
            Err(ApiError::forbidden())
        }
    }

    pub fn ensure_owner(&self, owner_id: i64) -> Result<(), ApiError> {
        if self.0.user_id == owner_id {
            Ok(())
        } else {
            Err(ApiError::forbidden())
        }
    }
}

impl AdminUser {
    pub fn id(&self) -> i64 {
        self.0.user_id
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))?;

        let claims = state.tokens.verify(token).map_err(|e| {
            debug!("Rejected bearer token: {}", e);
            ApiError::Unauthorized("Could not validate credentials".to_string())
        })?;
        let user_id = claims
            .user_id()
            .map_err(|_| ApiError::Unauthorized("Could not validate credentials".to_string()))?;

        let user = db::users::get_by_id(&state.db, user_id)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Could not validate credentials".to_string()))?;

        if user.status == UserStatus::Banned {
            return Err(ApiError::Forbidden("Account has been banned".to_string()));
        }
        Ok(CurrentUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ApiError::forbidden());
        }
        Ok(AdminUser(user))
    }
}

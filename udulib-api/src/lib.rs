//! udulib-api library interface
//!
//! Exposes the router and shared state so integration tests can drive the
//! service without binding a socket.

pub mod api;
pub mod auth;
pub mod db;
pub mod error;
pub mod mail;
pub mod oauth;
pub mod pagination;
pub mod preview;
pub mod storage;
pub mod tokens;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use udulib_common::config::Settings;
use udulib_common::security::TokenIssuer;

use crate::mail::Mailer;
use crate::oauth::GoogleOAuth;
use crate::preview::PreviewService;
use crate::storage::Storage;
use crate::tokens::EphemeralTokens;

/// Lifetime of an OAuth `state` value
const OAUTH_STATE_MINUTES: i64 = 10;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub settings: Arc<Settings>,
    pub tokens: Arc<TokenIssuer>,
    pub storage: Storage,
    pub preview: Arc<PreviewService>,
    pub mailer: Arc<dyn Mailer>,
    /// Password-reset token -> user id
    pub reset_tokens: EphemeralTokens<i64>,
    pub oauth_states: EphemeralTokens<()>,
    /// `None` when Google login is not configured
    pub google: Option<Arc<GoogleOAuth>>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        settings: Settings,
        storage: Storage,
        mailer: Arc<dyn Mailer>,
    ) -> anyhow::Result<Self> {
        let tokens = TokenIssuer::new(
            &settings.security.jwt_secret,
            settings.security.access_token_expire_minutes,
        );
        let google = GoogleOAuth::from_config(&settings.oauth.google)?.map(Arc::new);
        let reset_ttl = Duration::minutes(settings.security.password_reset_expire_minutes);

        Ok(Self {
            db,
            preview: Arc::new(PreviewService::new(settings.preview.clone())),
            tokens: Arc::new(tokens),
            storage,
            mailer,
            reset_tokens: EphemeralTokens::new(reset_ttl),
            oauth_states: EphemeralTokens::new(Duration::minutes(OAUTH_STATE_MINUTES)),
            google,
            startup_time: Utc::now(),
            settings: Arc::new(settings),
        })
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(parsed).allow_credentials(true)
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    // Multipart bodies carry the file plus form fields
    let body_limit = state.settings.storage.max_upload_bytes + 1024 * 1024;
    let cors = cors_layer(&state.settings.server.cors_origins);

    Router::new()
        .merge(api::health_routes())
        .nest("/api/v1", api::v1_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

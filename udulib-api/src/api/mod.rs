//! HTTP API handlers for udulib-api
//!
//! One module per resource, each exposing a `*_routes()` builder. Everything
//! except the health routes is nested under `/api/v1`.

pub mod academic_years;
pub mod auth;
pub mod comments;
pub mod departments;
pub mod documents;
pub mod files;
pub mod forum_posts;
pub mod forum_replies;
pub mod forums;
pub mod health;
pub mod history;
pub mod majors;
pub mod notifications;
pub mod password_reset;
pub mod previews;
pub mod ratings;
pub mod shared_links;
pub mod statistics;
pub mod subjects;
pub mod system_config;
pub mod tags;
pub mod upload;
pub mod users;

pub use health::health_routes;

use axum::Router;
use serde::Serialize;

use crate::AppState;

/// Plain `{"message": ...}` response body
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Routes mounted under `/api/v1`
pub fn v1_routes() -> Router<AppState> {
    Router::new()
        .merge(auth::auth_routes())
        .merge(password_reset::password_reset_routes())
        .merge(users::user_routes())
        .merge(majors::major_routes())
        .merge(academic_years::academic_year_routes())
        .merge(departments::department_routes())
        .merge(subjects::subject_routes())
        .merge(tags::tag_routes())
        .merge(documents::document_routes())
        .merge(previews::preview_routes())
        .merge(comments::comment_routes())
        .merge(ratings::rating_routes())
        .merge(forums::forum_routes())
        .merge(forum_posts::forum_post_routes())
        .merge(forum_replies::forum_reply_routes())
        .merge(notifications::notification_routes())
        .merge(shared_links::shared_link_routes())
        .merge(history::history_routes())
        .merge(statistics::statistics_routes())
        .merge(system_config::system_config_routes())
        .merge(files::file_routes())
}

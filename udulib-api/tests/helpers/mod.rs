//! Test Helper Utilities
//!
//! Builds the full router over an in-memory database and a temporary local
//! object store, with a mailer that records instead of sending.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;
use udulib_api::db::users::{self, NewUser};
use udulib_api::mail::{Mailer, OutgoingMail};
use udulib_api::storage::Storage;
use udulib_api::{build_router, AppState};
use udulib_common::config::Settings;
use udulib_common::db::connect_in_memory;
use udulib_common::models::{User, UserRole, UserStatus};
use udulib_common::security::hash_password;

pub const TEST_PASSWORD: &str = "secret123";
const MULTIPART_BOUNDARY: &str = "udulib-test-boundary";

/// Mailer that keeps every message for later inspection
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    /// Mail goes out on a background task; poll briefly until `count` arrive
    pub async fn wait_for(&self, count: usize) -> Vec<OutgoingMail> {
        for _ in 0..50 {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.sent()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

/// A test user with a valid bearer token
pub struct TestUser {
    pub user: User,
    pub token: String,
}

impl TestUser {
    pub fn id(&self) -> i64 {
        self.user.user_id
    }
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub pool: SqlitePool,
    pub mailer: Arc<RecordingMailer>,
    /// Keeps the local object store alive for the test
    _storage_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_settings(|_| {}).await
    }

    /// Like `new`, with `adjust` applied to the test settings first
    pub async fn with_settings(adjust: impl FnOnce(&mut Settings)) -> Self {
        let storage_dir = tempfile::tempdir().expect("Failed to create temp dir");

        let mut settings = Settings::default();
        settings.security.jwt_secret = "test-secret".to_string();
        settings.security.bcrypt_cost = 4;
        settings.storage.local_root = storage_dir.path().to_path_buf();
        settings.storage.max_upload_bytes = 1024 * 1024;
        settings.server.public_url = "http://localhost:8000".to_string();
        adjust(&mut settings);

        let pool = connect_in_memory().await.expect("Failed to create in-memory database");
        let storage = Storage::from_config(&settings.storage, &settings.security.jwt_secret, &settings.server.public_url)
            .expect("Failed to configure storage");
        storage.ensure_buckets().await;

        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::new(pool.clone(), settings, storage, mailer.clone()).expect("Failed to build state");
        let app = build_router(state.clone());

        Self {
            app,
            state,
            pool,
            mailer,
            _storage_dir: storage_dir,
        }
    }

    /// Insert an active user directly and issue a token for it
    pub async fn create_user(&self, username: &str, role: UserRole) -> TestUser {
        let user = users::create(
            &self.pool,
            NewUser {
                username: username.to_string(),
                email: format!("{}@udu.edu.vn", username),
                password_hash: hash_password(TEST_PASSWORD, 4).unwrap(),
                full_name: format!("{} Tester", username),
                role,
                status: UserStatus::Active,
                university_id: None,
                phone_number: None,
                google_id: None,
                avatar_url: None,
            },
        )
        .await
        .unwrap();
        let token = self.state.tokens.issue(user.user_id, user.role).unwrap().token;
        TestUser { user, token }
    }

    pub async fn admin(&self) -> TestUser {
        self.create_user("admin", UserRole::Admin).await
    }

    pub async fn student(&self, username: &str) -> TestUser {
        self.create_user(username, UserRole::Student).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
        };
        (status, json)
    }

    pub async fn request(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// Raw response, for endpoints returning files
    pub async fn get_raw(&self, uri: &str, token: Option<&str>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let response = self.app.clone().oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body.to_vec())
    }

    /// Create a major, a year and a subject; returns the subject id
    pub async fn seed_subject(&self, admin: &TestUser) -> i64 {
        let (status, major) = self
            .post(
                "/api/v1/majors",
                Some(&admin.token),
                json!({"major_name": "Information Technology", "major_code": "IT"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", major);
        let (status, year) = self
            .post(
                "/api/v1/academic-years",
                Some(&admin.token),
                json!({"year_name": "2024-2025", "year_order": 1}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", year);
        let (status, subject) = self
            .post(
                "/api/v1/subjects",
                Some(&admin.token),
                json!({
                    "subject_name": "Data Structures",
                    "subject_code": "IT201",
                    "major_id": major["major_id"],
                    "year_id": year["year_id"],
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", subject);
        subject["subject_id"].as_i64().unwrap()
    }

    /// Multipart POST of a single `file` field
    pub async fn upload_file(&self, uri: &str, token: Option<&str>, filename: &str, data: &[u8]) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(Method::POST).uri(uri).header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
        );
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = multipart_body(&[], "file", filename, data);
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    /// Path and query of a presigned URL served by the local backend
    pub fn local_path(url: &str) -> &str {
        url.strip_prefix("http://localhost:8000").expect("local presigned URL")
    }

    /// Multipart upload through `POST /api/v1/documents`
    pub async fn upload_document(
        &self,
        user: &TestUser,
        subject_id: i64,
        title: &str,
        filename: &str,
        data: &[u8],
        tags: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut fields = vec![("title", title.to_string()), ("subject_id", subject_id.to_string())];
        if let Some(tags) = tags {
            fields.push(("tags", tags.to_string()));
        }
        let body = multipart_body(&fields, "file", filename, data);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/documents")
            .header(header::AUTHORIZATION, format!("Bearer {}", user.token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }
}

pub fn multipart_body(fields: &[(&str, String)], file_field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                MULTIPART_BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            MULTIPART_BOUNDARY, file_field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}

/// Encoded PNG of a solid half-transparent colour
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([30, 120, 200, 128]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

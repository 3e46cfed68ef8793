//! Registration, login, profile and password reset over HTTP

mod helpers;

use axum::http::{header, Method, Request, StatusCode};
use axum::body::Body;
use helpers::{png_bytes, TestApp, TEST_PASSWORD};
use udulib_common::models::UserRole;
use serde_json::json;

fn reset_token_from(html: &str) -> String {
    let start = html.find("token=").expect("reset link in mail") + "token=".len();
    html[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new().await;
    let (status, json) = app.get("/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "udulib-api");
    assert_eq!(json["storage"], "local");
    assert!(json["git_hash"].is_string());
}

#[tokio::test]
async fn test_register_then_login() {
    let app = TestApp::new().await;

    let (status, user) = app
        .post(
            "/api/v1/auth/register",
            None,
            json!({
                "email": "lan@udu.edu.vn",
                "username": "lan",
                "password": "hunter22",
                "full_name": "Nguyen Lan"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", user);
    assert_eq!(user["role"], "student");
    assert!(user.get("password_hash").is_none());

    let (status, token) = app
        .post(
            "/api/v1/auth/login",
            None,
            json!({"email": "lan@udu.edu.vn", "password": "hunter22"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(token["token_type"], "bearer");
    let access = token["access_token"].as_str().unwrap();

    let (status, me) = app.get("/api/v1/users/me", Some(access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "lan");
    assert!(me["last_login"].is_string());
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_admin_role() {
    let app = TestApp::new().await;
    let existing = app.student("minh").await;

    let (status, _) = app
        .post(
            "/api/v1/auth/register",
            None,
            json!({
                "email": existing.user.email,
                "username": "someone",
                "password": "hunter22",
                "full_name": "Someone"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/v1/auth/register",
            None,
            json!({
                "email": "boss@udu.edu.vn",
                "username": "boss",
                "password": "hunter22",
                "full_name": "Boss",
                "role": "admin"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/v1/auth/register",
            None,
            json!({
                "email": "short@udu.edu.vn",
                "username": "short",
                "password": "123",
                "full_name": "Short"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bad_credentials_are_unauthorized() {
    let app = TestApp::new().await;
    let user = app.student("hoa").await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"email": user.user.email, "password": "wrong-password"}).to_string(),
        ))
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.app.clone(), request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");

    let (status, _) = app.get("/api/v1/users/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/v1/users/me", Some("not-a-token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_admin_endpoints_require_admin() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let student = app.student("tuan").await;

    let (status, _) = app.get("/api/v1/users", Some(&student.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, page) = app.get("/api/v1/users", Some(&admin.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
}

#[tokio::test]
async fn test_password_reset_flow() {
    let app = TestApp::new().await;
    let user = app.student("thu").await;

    let (status, reply) = app
        .post(
            "/api/v1/password-reset/request-reset",
            None,
            json!({"email": user.user.email}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let sent = app.mailer.wait_for(1).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, user.user.email);
    let token = reset_token_from(&sent[0].html);

    let (status, check) = app
        .get(&format!("/api/v1/password-reset/verify-token/{}", token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check["valid"], true);
    assert_eq!(check["email"], user.user.email.as_str());

    let (status, _) = app
        .post(
            "/api/v1/password-reset/confirm-reset",
            None,
            json!({"token": token, "new_password": "brand-new-pass"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Single use
    let (status, _) = app
        .post(
            "/api/v1/password-reset/confirm-reset",
            None,
            json!({"token": token, "new_password": "another-pass"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/v1/auth/login",
            None,
            json!({"email": user.user.email, "password": TEST_PASSWORD}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app
        .post(
            "/api/v1/auth/login",
            None,
            json!({"email": user.user.email, "password": "brand-new-pass"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Unknown addresses get the same answer and no mail
    let (status, unknown) = app
        .post(
            "/api/v1/password-reset/request-reset",
            None,
            json!({"email": "nobody@udu.edu.vn"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unknown["message"], reply["message"]);
}

#[tokio::test]
async fn test_google_login_unconfigured() {
    let app = TestApp::new().await;
    let (status, json) = app.get("/api/v1/auth/google/login", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_last_active_admin_is_protected() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let student = app.student("quang").await;
    let admin_path = format!("/api/v1/users/{}", admin.id());

    let (status, body) = app.delete(&admin_path, Some(&admin.token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    let (status, _) = app
        .request(
            Method::PATCH,
            &format!("{}/status", admin_path),
            Some(&admin.token),
            Some(json!({"status": "banned"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .post(
            "/api/v1/users/bulk-deactivate",
            Some(&admin.token),
            json!({"user_ids": [student.id(), admin.id()]}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing was changed by the refused bulk request
    let (_, me) = app.get("/api/v1/users/me", Some(&student.token)).await;
    assert_eq!(me["status"], "active");

    // Reactivating is always allowed
    let (status, _) = app
        .request(
            Method::PATCH,
            &format!("{}/status", admin_path),
            Some(&admin.token),
            Some(json!({"status": "active"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_bulk_deactivate_counts_each_admin_once() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let deputy = app.create_user("deputy", UserRole::Admin).await;

    let (status, result) = app
        .post(
            "/api/v1/users/bulk-deactivate",
            Some(&admin.token),
            json!({"user_ids": [deputy.id(), deputy.id()]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", result);
    assert_eq!(result["deactivated"], 1);

    // Now the remaining admin is the last one
    let (status, _) = app
        .delete(&format!("/api/v1/users/{}", admin.id()), Some(&admin.token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_private_profile_visibility() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let owner = app.student("mai").await;
    let other = app.student("khoa").await;
    let profile = format!("/api/v1/users/{}/profile", owner.id());

    let (status, public) = app.get(&profile, Some(&other.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(public["documents_count"], 0);

    let (status, me) = app
        .put("/api/v1/users/me/privacy", Some(&owner.token), json!({"is_private": true}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["is_private"], true);

    let (status, _) = app.get(&profile, Some(&other.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get(&profile, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get(&profile, Some(&owner.token)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&profile, Some(&admin.token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_avatar_upload_replace_and_delete() {
    let app = TestApp::with_settings(|s| s.storage.max_upload_bytes = 8 * 1024 * 1024).await;
    let user = app.student("trang").await;

    let (status, _) = app.get("/api/v1/users/me/avatar", Some(&user.token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .upload_file("/api/v1/users/me/avatar", Some(&user.token), "avatar.bmp", &png_bytes(4, 4))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let too_big = vec![0u8; 5 * 1024 * 1024 + 1];
    let (status, _) = app
        .upload_file("/api/v1/users/me/avatar", Some(&user.token), "avatar.png", &too_big)
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let first = png_bytes(8, 8);
    let (status, updated) = app
        .upload_file("/api/v1/users/me/avatar", Some(&user.token), "avatar.png", &first)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", updated);
    let first_ref = updated["avatar_url"].as_str().unwrap().to_string();

    let (_, avatar) = app.get("/api/v1/users/me/avatar", Some(&user.token)).await;
    let first_url = TestApp::local_path(avatar["avatar_url"].as_str().unwrap()).to_string();
    let (status, _, body) = app.get_raw(&first_url, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, first);

    // Replacing removes the previous object
    let second = png_bytes(16, 16);
    let (status, updated) = app
        .upload_file("/api/v1/users/me/avatar", Some(&user.token), "avatar.png", &second)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(updated["avatar_url"].as_str().unwrap(), first_ref);
    let (status, _, _) = app.get_raw(&first_url, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.delete("/api/v1/users/me/avatar", Some(&user.token)).await;
    assert_eq!(status, StatusCode::OK);
    let (_, me) = app.get("/api/v1/users/me", Some(&user.token)).await;
    assert!(me["avatar_url"].is_null());
    let (status, _) = app.delete("/api/v1/users/me/avatar", Some(&user.token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

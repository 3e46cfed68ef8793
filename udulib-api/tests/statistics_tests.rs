//! Reporting endpoints over a small seeded library

mod helpers;

use axum::http::StatusCode;
use helpers::{TestApp, TestUser};
use serde_json::json;

/// Two approved uploads; the second one gets downloaded twice and rated
async fn seed_library(app: &TestApp, admin: &TestUser, reader: &TestUser) -> (i64, i64) {
    let subject_id = app.seed_subject(admin).await;
    let (_, first) = app
        .upload_document(admin, subject_id, "Outline", "outline.txt", b"chapter list", None)
        .await;
    let (_, second) = app
        .upload_document(admin, subject_id, "Slides", "slides.pdf", b"%PDF-1.4 slides", None)
        .await;
    let first_id = first["document_id"].as_i64().unwrap();
    let second_id = second["document_id"].as_i64().unwrap();

    for _ in 0..2 {
        let (status, _, _) = app
            .get_raw(&format!("/api/v1/documents/{}/download", second_id), Some(&reader.token))
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = app
        .post("/api/v1/ratings", Some(&reader.token), json!({"document_id": second_id, "score": 4}))
        .await;
    assert_eq!(status, StatusCode::OK);
    (first_id, second_id)
}

#[tokio::test]
async fn test_overview_counts() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let reader = app.student("hung").await;
    seed_library(&app, &admin, &reader).await;

    let (status, _) = app.get("/api/v1/statistics/overview", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, overview) = app.get("/api/v1/statistics/overview", Some(&reader.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview["total_users"], 2);
    assert_eq!(overview["total_documents"], 2);
    assert_eq!(overview["total_subjects"], 1);
    assert_eq!(overview["total_majors"], 1);
    assert_eq!(overview["total_downloads"], 2);
    assert_eq!(overview["total_ratings"], 1);

    let (_, by_status) = app
        .get("/api/v1/statistics/documents/by-status", Some(&reader.token))
        .await;
    assert_eq!(by_status["approved"], 2);
}

#[tokio::test]
async fn test_rankings_respect_limits() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let reader = app.student("kim").await;
    let (_, slides_id) = seed_library(&app, &admin, &reader).await;

    let (status, top) = app
        .get("/api/v1/statistics/documents/most-downloaded?limit=1", Some(&reader.token))
        .await;
    assert_eq!(status, StatusCode::OK);
    let top = top.as_array().unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0]["document_id"], slides_id);
    assert_eq!(top[0]["download_count"], 2);

    let (_, rated) = app
        .get("/api/v1/statistics/documents/highest-rated", Some(&reader.token))
        .await;
    assert_eq!(rated.as_array().unwrap().len(), 1);
    assert_eq!(rated[0]["document_id"], slides_id);

    for bad in ["limit=0", "limit=101"] {
        let (status, _) = app
            .get(&format!("/api/v1/statistics/documents/most-viewed?{}", bad), Some(&reader.token))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", bad);
    }
    let (status, _) = app
        .get("/api/v1/statistics/activity/by-time?days=366", Some(&reader.token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_storage_usage_is_admin_only() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let reader = app.student("nhi").await;
    seed_library(&app, &admin, &reader).await;

    let (status, _) = app.get("/api/v1/statistics/storage/usage", Some(&reader.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, usage) = app.get("/api/v1/statistics/storage/usage", Some(&admin.token)).await;
    assert_eq!(status, StatusCode::OK);
    let expected = (b"chapter list".len() + b"%PDF-1.4 slides".len()) as i64;
    assert_eq!(usage["total_storage_used"], expected);
    let shares: f64 = usage["by_file_type"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["percentage"].as_f64().unwrap())
        .sum();
    assert!((shares - 100.0).abs() < 0.05);
}

//! Document upload, moderation, download, tagging and previews

mod helpers;

use axum::http::{header, StatusCode};
use helpers::{png_bytes, TestApp};
use serde_json::json;

const NOTES: &[u8] = b"Lecture 1\nStacks and queues\n";

#[tokio::test]
async fn test_student_upload_is_pending_until_approved() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let owner = app.student("mai").await;
    let other = app.student("khoa").await;
    let subject_id = app.seed_subject(&admin).await;

    let (status, doc) = app
        .upload_document(&owner, subject_id, "Lecture 1", "notes.txt", NOTES, Some(r#"["stacks", "queues"]"#))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", doc);
    assert_eq!(doc["status"], "pending");
    assert_eq!(doc["file_type"], "TXT");
    assert_eq!(doc["file_size"], NOTES.len());
    assert_eq!(doc["tags"].as_array().unwrap().len(), 2);
    let id = doc["document_id"].as_i64().unwrap();

    let (_, public) = app.get("/api/v1/documents/public", None).await;
    assert_eq!(public["total"], 0);
    let (status, _) = app.get(&format!("/api/v1/documents/{}", id), Some(&other.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get(&format!("/api/v1/documents/{}", id), Some(&owner.token)).await;
    assert_eq!(status, StatusCode::OK);

    // Only admins moderate
    let (status, _) = app
        .request(
            axum::http::Method::PATCH,
            &format!("/api/v1/documents/{}/status", id),
            Some(&owner.token),
            Some(json!({"status": "approved"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, approved) = app
        .request(
            axum::http::Method::PATCH,
            &format!("/api/v1/documents/{}/status", id),
            Some(&admin.token),
            Some(json!({"status": "approved"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "approved");

    let (_, public) = app.get("/api/v1/documents/public", None).await;
    assert_eq!(public["total"], 1);
    let (status, _) = app.get(&format!("/api/v1/documents/{}", id), Some(&other.token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, notes) = app.get("/api/v1/notifications", Some(&owner.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(notes["total"], 1);
    assert_eq!(notes["items"][0]["type"], "document_status");
    assert_eq!(notes["items"][0]["reference_id"], id);
}

#[tokio::test]
async fn test_admin_upload_is_approved() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let subject_id = app.seed_subject(&admin).await;

    let (status, doc) = app
        .upload_document(&admin, subject_id, "Syllabus", "syllabus.pdf", b"%PDF-1.4", None)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(doc["status"], "approved");
    assert_eq!(doc["file_type"], "PDF");
}

#[tokio::test]
async fn test_upload_validation() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let student = app.student("lan").await;
    app.seed_subject(&admin).await;

    let (status, _) = app
        .upload_document(&student, 9999, "Lost", "lost.txt", NOTES, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let oversized = vec![b'x'; 1024 * 1024 + 1];
    let subject_id = 1;
    let (status, _) = app
        .upload_document(&student, subject_id, "Huge", "huge.txt", &oversized, None)
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_download_records_history_and_counts() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let reader = app.student("quang").await;
    let subject_id = app.seed_subject(&admin).await;
    let (_, doc) = app
        .upload_document(&admin, subject_id, "Lecture 1", "notes.txt", NOTES, None)
        .await;
    let id = doc["document_id"].as_i64().unwrap();

    let (status, headers, body) = app
        .get_raw(&format!("/api/v1/documents/{}/download", id), Some(&reader.token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, NOTES);
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment;"));
    assert!(disposition.contains("Lecture 1.txt"));

    let (status, viewed) = app
        .post(&format!("/api/v1/documents/{}/view", id), Some(&reader.token), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(viewed["view_count"], 1);

    let (status, liked) = app
        .post(&format!("/api/v1/documents/{}/like", id), Some(&reader.token), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(liked["liked"], true);
    assert_eq!(liked["like_count"], 1);

    let (status, stats) = app
        .get(&format!("/api/v1/documents/{}/stats", id), Some(&reader.token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["download_count"], 1);
    assert_eq!(stats["view_count"], 1);
    assert_eq!(stats["is_liked"], true);

    let (status, history) = app.get("/api/v1/document-history", Some(&reader.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["total"], 2);

    // Public download of an approved document needs no token
    let (status, _, body) = app
        .get_raw(&format!("/api/v1/documents/public/{}/download", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, NOTES);
}

#[tokio::test]
async fn test_presigned_download_url_is_served_locally() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let subject_id = app.seed_subject(&admin).await;
    let (_, doc) = app
        .upload_document(&admin, subject_id, "Lecture 1", "notes.txt", NOTES, None)
        .await;
    let id = doc["document_id"].as_i64().unwrap();

    let (status, url) = app
        .get(&format!("/api/v1/documents/{}/download-url", id), Some(&admin.token))
        .await;
    assert_eq!(status, StatusCode::OK);
    let full = url["download_url"].as_str().unwrap();
    let path = full.strip_prefix("http://localhost:8000").unwrap();
    assert!(path.starts_with("/api/v1/files/documents/"));

    let (status, _, body) = app.get_raw(path, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, NOTES);

    let tampered = format!("{}0", path);
    let (status, _, _) = app.get_raw(&tampered, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_document_tags_and_tag_listings() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let subject_id = app.seed_subject(&admin).await;
    let (_, first) = app
        .upload_document(&admin, subject_id, "Stacks", "stacks.txt", NOTES, Some(r#"["exam"]"#))
        .await;
    let (_, second) = app
        .upload_document(&admin, subject_id, "Queues", "queues.txt", NOTES, None)
        .await;
    let second_id = second["document_id"].as_i64().unwrap();

    let (status, tags) = app
        .post(
            &format!("/api/v1/documents/{}/tags", second_id),
            Some(&admin.token),
            json!({"tags": ["exam", "lab"]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tags["tags"], json!(["exam", "lab"]));

    let (status, by_tag) = app.get("/api/v1/documents/public/by-tag/exam", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_tag["total"], 2);

    let (status, by_tags) = app
        .get("/api/v1/documents/public/by-tags?tags=lab&tags=missing", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_tags["total"], 1);
    assert_eq!(by_tags["items"][0]["document_id"], second_id);

    let (status, _) = app
        .delete(&format!("/api/v1/documents/{}/tags/lab", second_id), Some(&admin.token))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .delete(&format!("/api/v1/documents/{}/tags/lab", second_id), Some(&admin.token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(first["document_id"].is_i64());
}

#[tokio::test]
async fn test_owner_can_delete_and_others_cannot() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let owner = app.student("vy").await;
    let other = app.student("nam").await;
    let subject_id = app.seed_subject(&admin).await;
    let (_, doc) = app
        .upload_document(&owner, subject_id, "Draft", "draft.txt", NOTES, None)
        .await;
    let id = doc["document_id"].as_i64().unwrap();

    let (status, _) = app.delete(&format!("/api/v1/documents/{}", id), Some(&other.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.delete(&format!("/api/v1/documents/{}", id), Some(&owner.token)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&format!("/api/v1/documents/{}", id), Some(&owner.token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_text_preview_renders_jpeg() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let subject_id = app.seed_subject(&admin).await;
    let (_, doc) = app
        .upload_document(&admin, subject_id, "Lecture 1", "notes.txt", NOTES, None)
        .await;
    let id = doc["document_id"].as_i64().unwrap();

    let (status, support) = app
        .get(&format!("/api/v1/documents/public/{}/is-supported", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(support["is_supported"], true);

    let (status, headers, body) = app
        .get_raw(&format!("/api/v1/documents/{}/thumbnail", id), Some(&admin.token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=3600");
    assert_eq!(&body[..2], &[0xFF, 0xD8]);
}

#[tokio::test]
async fn test_tag_listing_defaults_to_approved() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let owner = app.student("thao").await;
    let other = app.student("vinh").await;
    let subject_id = app.seed_subject(&admin).await;
    let (status, _) = app
        .upload_document(&owner, subject_id, "Draft", "draft.txt", NOTES, Some(r#"["exam"]"#))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, listed) = app.get("/api/v1/documents/by-tag/exam", Some(&owner.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["total"], 0);

    let (_, pending) = app
        .get("/api/v1/documents/by-tag/exam?status=pending", Some(&owner.token))
        .await;
    assert_eq!(pending["total"], 1);
    let (_, pending) = app
        .get("/api/v1/documents/by-tag/exam?status=pending", Some(&other.token))
        .await;
    assert_eq!(pending["total"], 0);
    let (_, pending) = app
        .get("/api/v1/documents/by-tags?tags=exam&status=pending", Some(&admin.token))
        .await;
    assert_eq!(pending["total"], 1);
}

#[tokio::test]
async fn test_image_preview_is_resized_and_counted() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let reader = app.student("linh").await;
    let subject_id = app.seed_subject(&admin).await;
    let diagram = png_bytes(1000, 500);
    let (status, doc) = app
        .upload_document(&admin, subject_id, "Diagram", "diagram.png", &diagram, None)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", doc);
    assert_eq!(doc["file_type"], "IMAGE");
    let id = doc["document_id"].as_i64().unwrap();

    let (status, headers, body) = app
        .get_raw(&format!("/api/v1/documents/{}/preview?size=small", id), Some(&reader.token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=3600");
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("inline;"));
    assert!(disposition.contains("preview_"));
    let decoded = image::load_from_memory(&body).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (300, 150));

    let (status, headers, body) = app
        .get_raw(&format!("/api/v1/documents/public/{}/preview?size=original", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(body, diagram);

    // Only the authenticated preview counts as a view
    let (_, stats) = app
        .get(&format!("/api/v1/documents/{}/stats", id), Some(&reader.token))
        .await;
    assert_eq!(stats["view_count"], 1);
    let (_, history) = app
        .get("/api/v1/document-history?action=view", Some(&reader.token))
        .await;
    assert_eq!(history["total"], 1);
    assert_eq!(history["items"][0]["document_id"], id);
}

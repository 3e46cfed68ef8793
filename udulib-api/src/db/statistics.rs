//! Aggregate reporting queries
//!
//! Each function runs one or two read-only aggregate statements. Averages
//! only count scored ratings (`score > 0`); a zero score is a bare like.

use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::{FromRow, Result, SqlitePool};
use std::collections::BTreeMap;

#[derive(Debug, Serialize, FromRow)]
pub struct Overview {
    pub total_users: i64,
    pub total_documents: i64,
    pub total_subjects: i64,
    pub total_majors: i64,
    pub total_views: i64,
    pub total_downloads: i64,
    pub total_comments: i64,
    pub total_ratings: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct SubjectDocumentCount {
    pub subject_name: String,
    pub subject_code: String,
    pub document_count: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct MajorDocumentCount {
    pub major_name: String,
    pub major_code: String,
    pub document_count: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct FileTypeCount {
    pub file_type: String,
    pub count: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct TopDocument {
    pub document_id: i64,
    pub title: String,
    pub view_count: i64,
    pub download_count: i64,
    pub subject_name: String,
    pub uploaded_by: String,
}

#[derive(Debug, Serialize, FromRow)]
pub struct RatedDocument {
    pub document_id: i64,
    pub title: String,
    pub avg_rating: f64,
    pub rating_count: i64,
    pub view_count: i64,
    pub download_count: i64,
    pub subject_name: String,
    pub uploaded_by: String,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ActiveUser {
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    pub documents_uploaded: i64,
    pub comments_made: i64,
    pub ratings_given: i64,
    pub activity_score: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct FileTypeUsage {
    pub file_type: String,
    pub file_count: i64,
    pub total_size: i64,
    pub avg_size: f64,
    #[sqlx(skip)]
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct StorageUsage {
    pub total_storage_used: i64,
    pub by_file_type: Vec<FileTypeUsage>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ScoreCount {
    pub score: i64,
    pub count: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ForumPostCount {
    pub forum_id: i64,
    pub subject_name: String,
    pub post_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ForumActivity {
    pub total_posts: i64,
    pub total_replies: i64,
    pub most_active_forums: Vec<ForumPostCount>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct EngagementTrend {
    pub date: String,
    pub total_views: i64,
    pub total_downloads: i64,
    pub active_documents: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct SubjectPerformance {
    pub subject_name: String,
    pub subject_code: String,
    pub document_count: i64,
    pub total_views: i64,
    pub total_downloads: i64,
    pub avg_rating: f64,
    pub rating_count: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ContentQuality {
    pub document_id: i64,
    pub title: String,
    pub subject_name: String,
    pub uploaded_by: String,
    pub comment_count: i64,
    pub rating_count: i64,
    pub avg_rating: f64,
    pub view_count: i64,
    pub download_count: i64,
    pub status: String,
    pub engagement_score: i64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `YYYY-MM-DD` of the first day inside a trailing window
fn window_start(days: i64) -> String {
    (Utc::now() - Duration::days(days)).format("%Y-%m-%d").to_string()
}

pub async fn overview(pool: &SqlitePool) -> Result<Overview> {
    sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users) AS total_users,
            (SELECT COUNT(*) FROM documents) AS total_documents,
            (SELECT COUNT(*) FROM subjects) AS total_subjects,
            (SELECT COUNT(*) FROM majors) AS total_majors,
            (SELECT COALESCE(SUM(view_count), 0) FROM documents) AS total_views,
            (SELECT COALESCE(SUM(download_count), 0) FROM documents) AS total_downloads,
            (SELECT COUNT(*) FROM comments) AS total_comments,
            (SELECT COUNT(*) FROM ratings) AS total_ratings
        "#,
    )
    .fetch_one(pool)
    .await
}

pub async fn documents_by_status(pool: &SqlitePool) -> Result<BTreeMap<String, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as("SELECT status, COUNT(*) FROM documents GROUP BY status")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().collect())
}

pub async fn documents_by_subject(pool: &SqlitePool, limit: i64) -> Result<Vec<SubjectDocumentCount>> {
    sqlx::query_as(
        r#"
        SELECT s.subject_name, s.subject_code, COUNT(d.document_id) AS document_count
        FROM subjects s
        LEFT JOIN documents d ON d.subject_id = s.subject_id
        GROUP BY s.subject_id
        ORDER BY document_count DESC, s.subject_name
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn documents_by_major(pool: &SqlitePool) -> Result<Vec<MajorDocumentCount>> {
    sqlx::query_as(
        r#"
        SELECT m.major_name, m.major_code, COUNT(d.document_id) AS document_count
        FROM majors m
        LEFT JOIN subjects s ON s.major_id = m.major_id
        LEFT JOIN documents d ON d.subject_id = s.subject_id
        GROUP BY m.major_id
        ORDER BY document_count DESC, m.major_name
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn documents_by_file_type(pool: &SqlitePool) -> Result<Vec<FileTypeCount>> {
    sqlx::query_as(
        "SELECT file_type, COUNT(*) AS count FROM documents GROUP BY file_type ORDER BY count DESC, file_type",
    )
    .fetch_all(pool)
    .await
}

async fn top_documents(pool: &SqlitePool, order_column: &str, limit: i64) -> Result<Vec<TopDocument>> {
    sqlx::query_as(&format!(
        r#"
        SELECT d.document_id, d.title, d.view_count, d.download_count, s.subject_name, u.username AS uploaded_by
        FROM documents d
        JOIN subjects s ON s.subject_id = d.subject_id
        JOIN users u ON u.user_id = d.user_id
        ORDER BY d.{order_column} DESC, d.document_id
        LIMIT ?
        "#
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn most_viewed(pool: &SqlitePool, limit: i64) -> Result<Vec<TopDocument>> {
    top_documents(pool, "view_count", limit).await
}

pub async fn most_downloaded(pool: &SqlitePool, limit: i64) -> Result<Vec<TopDocument>> {
    top_documents(pool, "download_count", limit).await
}

pub async fn highest_rated(pool: &SqlitePool, limit: i64) -> Result<Vec<RatedDocument>> {
    let mut rows: Vec<RatedDocument> = sqlx::query_as(
        r#"
        SELECT d.document_id, d.title, AVG(r.score) AS avg_rating, COUNT(r.rating_id) AS rating_count,
               d.view_count, d.download_count, s.subject_name, u.username AS uploaded_by
        FROM documents d
        JOIN subjects s ON s.subject_id = d.subject_id
        JOIN users u ON u.user_id = d.user_id
        JOIN ratings r ON r.document_id = d.document_id AND r.score > 0
        GROUP BY d.document_id
        ORDER BY avg_rating DESC, rating_count DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    for row in &mut rows {
        row.avg_rating = round2(row.avg_rating);
    }
    Ok(rows)
}

pub async fn most_active_users(pool: &SqlitePool, limit: i64) -> Result<Vec<ActiveUser>> {
    sqlx::query_as(
        r#"
        SELECT user_id, username, full_name, documents_uploaded, comments_made, ratings_given,
               documents_uploaded + comments_made + ratings_given AS activity_score
        FROM (
            SELECT u.user_id, u.username, u.full_name,
                   (SELECT COUNT(*) FROM documents d WHERE d.user_id = u.user_id) AS documents_uploaded,
                   (SELECT COUNT(*) FROM comments c WHERE c.user_id = u.user_id) AS comments_made,
                   (SELECT COUNT(*) FROM ratings r WHERE r.user_id = u.user_id) AS ratings_given
            FROM users u
            WHERE u.role != 'admin'
        )
        ORDER BY activity_score DESC, username
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// `{date: {document|comment|rating: count}}` for the trailing window
pub async fn activity_by_time(pool: &SqlitePool, days: i64) -> Result<BTreeMap<String, BTreeMap<String, i64>>> {
    let start = window_start(days);
    let rows: Vec<(String, String, i64)> = sqlx::query_as(
        r#"
        SELECT DATE(created_at) AS day, 'document' AS kind, COUNT(*) FROM documents
            WHERE DATE(created_at) >= ?1 GROUP BY day
        UNION ALL
        SELECT DATE(created_at) AS day, 'comment' AS kind, COUNT(*) FROM comments
            WHERE DATE(created_at) >= ?1 GROUP BY day
        UNION ALL
        SELECT DATE(created_at) AS day, 'rating' AS kind, COUNT(*) FROM ratings
            WHERE DATE(created_at) >= ?1 GROUP BY day
        "#,
    )
    .bind(start)
    .fetch_all(pool)
    .await?;

    let mut by_day: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
    for (day, kind, count) in rows {
        *by_day.entry(day).or_default().entry(kind).or_default() += count;
    }
    Ok(by_day)
}

pub async fn storage_usage(pool: &SqlitePool) -> Result<StorageUsage> {
    let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(file_size), 0) FROM documents")
        .fetch_one(pool)
        .await?;
    let mut by_file_type: Vec<FileTypeUsage> = sqlx::query_as(
        r#"
        SELECT file_type, COUNT(*) AS file_count, COALESCE(SUM(file_size), 0) AS total_size,
               COALESCE(AVG(file_size), 0.0) AS avg_size
        FROM documents
        GROUP BY file_type
        ORDER BY total_size DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    for usage in &mut by_file_type {
        usage.avg_size = round2(usage.avg_size);
        usage.percentage = if total > 0 {
            round2(usage.total_size as f64 / total as f64 * 100.0)
        } else {
            0.0
        };
    }
    Ok(StorageUsage {
        total_storage_used: total,
        by_file_type,
    })
}

pub async fn rating_distribution(pool: &SqlitePool) -> Result<Vec<ScoreCount>> {
    sqlx::query_as("SELECT score, COUNT(*) AS count FROM ratings WHERE score > 0 GROUP BY score ORDER BY score")
        .fetch_all(pool)
        .await
}

pub async fn forum_activity(pool: &SqlitePool) -> Result<ForumActivity> {
    let (total_posts, total_replies): (i64, i64) = sqlx::query_as(
        "SELECT (SELECT COUNT(*) FROM forum_posts), (SELECT COUNT(*) FROM forum_replies)",
    )
    .fetch_one(pool)
    .await?;
    let most_active_forums = sqlx::query_as(
        r#"
        SELECT f.forum_id, s.subject_name, COUNT(p.post_id) AS post_count
        FROM forums f
        JOIN subjects s ON s.subject_id = f.subject_id
        LEFT JOIN forum_posts p ON p.forum_id = f.forum_id
        GROUP BY f.forum_id
        ORDER BY post_count DESC, s.subject_name
        LIMIT 10
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(ForumActivity {
        total_posts,
        total_replies,
        most_active_forums,
    })
}

/// Views and downloads of documents touched in the window, by day of last update
pub async fn engagement_trends(pool: &SqlitePool, days: i64) -> Result<Vec<EngagementTrend>> {
    sqlx::query_as(
        r#"
        SELECT DATE(updated_at) AS date,
               COALESCE(SUM(view_count), 0) AS total_views,
               COALESCE(SUM(download_count), 0) AS total_downloads,
               COUNT(*) AS active_documents
        FROM documents
        WHERE DATE(updated_at) >= ?
        GROUP BY date
        ORDER BY date DESC
        "#,
    )
    .bind(window_start(days))
    .fetch_all(pool)
    .await
}

pub async fn subject_performance(pool: &SqlitePool, limit: i64) -> Result<Vec<SubjectPerformance>> {
    // Subqueries keep the view/download sums from multiplying by the rating rows
    let mut rows: Vec<SubjectPerformance> = sqlx::query_as(
        r#"
        SELECT s.subject_name, s.subject_code,
               (SELECT COUNT(*) FROM documents d WHERE d.subject_id = s.subject_id) AS document_count,
               (SELECT COALESCE(SUM(d.view_count), 0) FROM documents d WHERE d.subject_id = s.subject_id) AS total_views,
               (SELECT COALESCE(SUM(d.download_count), 0) FROM documents d WHERE d.subject_id = s.subject_id) AS total_downloads,
               (SELECT COALESCE(AVG(r.score), 0.0) FROM ratings r JOIN documents d ON d.document_id = r.document_id
                    WHERE d.subject_id = s.subject_id AND r.score > 0) AS avg_rating,
               (SELECT COUNT(*) FROM ratings r JOIN documents d ON d.document_id = r.document_id
                    WHERE d.subject_id = s.subject_id AND r.score > 0) AS rating_count
        FROM subjects s
        ORDER BY total_views DESC, document_count DESC, s.subject_name
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    for row in &mut rows {
        row.avg_rating = round2(row.avg_rating);
    }
    Ok(rows)
}

/// Top 20 documents with feedback; engagement = comments + ratings + views/10
pub async fn content_quality(pool: &SqlitePool) -> Result<Vec<ContentQuality>> {
    let mut rows: Vec<ContentQuality> = sqlx::query_as(
        r#"
        SELECT document_id, title, subject_name, uploaded_by, comment_count, rating_count, avg_rating,
               view_count, download_count, status,
               comment_count + rating_count + view_count / 10 AS engagement_score
        FROM (
            SELECT d.document_id, d.title, s.subject_name, u.username AS uploaded_by,
                   (SELECT COUNT(*) FROM comments c WHERE c.document_id = d.document_id) AS comment_count,
                   (SELECT COUNT(*) FROM ratings r WHERE r.document_id = d.document_id AND r.score > 0) AS rating_count,
                   (SELECT COALESCE(AVG(r.score), 0.0) FROM ratings r
                        WHERE r.document_id = d.document_id AND r.score > 0) AS avg_rating,
                   d.view_count, d.download_count, d.status
            FROM documents d
            JOIN subjects s ON s.subject_id = d.subject_id
            JOIN users u ON u.user_id = d.user_id
        )
        WHERE comment_count > 0 OR rating_count > 0
        ORDER BY avg_rating DESC, comment_count DESC, view_count DESC
        LIMIT 20
        "#,
    )
    .fetch_all(pool)
    .await?;
    for row in &mut rows {
        row.avg_rating = round2(row.avg_rating);
    }
    Ok(rows)
}

//! Document queries: filtering, counters, likes

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Result, Sqlite, SqlitePool};
use std::collections::HashMap;
use udulib_common::models::{ContentStatus, Document, FileType, HistoryAction, Tag};

use crate::pagination::Pagination;

const COLUMNS: &str = "d.document_id, d.title, d.description, d.file_path, d.file_size, d.file_type, d.subject_id, \
                       d.user_id, d.status, d.view_count, d.download_count, d.like_count, d.created_at, d.updated_at";

/// Sortable columns of document listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentOrder {
    #[default]
    CreatedAt,
    UpdatedAt,
    Title,
    ViewCount,
    DownloadCount,
    LikeCount,
}

impl DocumentOrder {
    fn column(&self) -> &'static str {
        match self {
            DocumentOrder::CreatedAt => "d.created_at",
            DocumentOrder::UpdatedAt => "d.updated_at",
            DocumentOrder::Title => "d.title",
            DocumentOrder::ViewCount => "d.view_count",
            DocumentOrder::DownloadCount => "d.download_count",
            DocumentOrder::LikeCount => "d.like_count",
        }
    }
}

#[derive(Debug, Default)]
pub struct DocumentFilter {
    pub subject_id: Option<i64>,
    pub user_id: Option<i64>,
    pub major_id: Option<i64>,
    pub academic_year_id: Option<i64>,
    pub status: Option<ContentStatus>,
    pub file_type: Option<FileType>,
    /// Any-of tag names
    pub tags: Vec<String>,
    pub search: Option<String>,
    /// Restrict to approved documents plus this user's own
    pub visible_to: Option<i64>,
    pub order_by: DocumentOrder,
    pub order_desc: bool,
}

pub struct NewDocument {
    pub title: String,
    pub description: Option<String>,
    pub file_path: String,
    pub file_size: i64,
    pub file_type: FileType,
    pub subject_id: i64,
    pub user_id: i64,
    pub status: ContentStatus,
}

#[derive(Debug, Default)]
pub struct DocumentChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<ContentStatus>,
}

#[derive(Debug, Serialize)]
pub struct DocumentStats {
    pub document_id: i64,
    pub view_count: i64,
    pub download_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub is_liked: bool,
}

#[derive(Debug, Serialize, FromRow)]
pub struct RatingSummary {
    pub average_rating: f64,
    pub rating_count: i64,
}

/// Outcome of a like/unlike call
#[derive(Debug, Serialize)]
pub struct LikeState {
    pub liked: bool,
    pub like_count: i64,
}

pub async fn get(pool: &SqlitePool, document_id: i64) -> Result<Option<Document>> {
    sqlx::query_as(&format!("SELECT {} FROM documents d WHERE d.document_id = ?", COLUMNS))
        .bind(document_id)
        .fetch_optional(pool)
        .await
}

fn push_filter<'a>(qb: &mut QueryBuilder<'a, Sqlite>, filter: &'a DocumentFilter) {
    qb.push(" FROM documents d JOIN subjects s ON s.subject_id = d.subject_id WHERE 1=1");
    if let Some(subject_id) = filter.subject_id {
        qb.push(" AND d.subject_id = ").push_bind(subject_id);
    }
    if let Some(user_id) = filter.user_id {
        qb.push(" AND d.user_id = ").push_bind(user_id);
    }
    if let Some(major_id) = filter.major_id {
        qb.push(" AND s.major_id = ").push_bind(major_id);
    }
    if let Some(year_id) = filter.academic_year_id {
        qb.push(" AND s.year_id = ").push_bind(year_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND d.status = ").push_bind(status);
    }
    if let Some(file_type) = filter.file_type {
        qb.push(" AND d.file_type = ").push_bind(file_type);
    }
    if let Some(viewer) = filter.visible_to {
        qb.push(" AND (d.status = 'approved' OR d.user_id = ").push_bind(viewer).push(")");
    }
    if !filter.tags.is_empty() {
        qb.push(
            " AND d.document_id IN (SELECT dt.document_id FROM document_tags dt \
             JOIN tags t ON t.tag_id = dt.tag_id WHERE t.tag_name IN (",
        );
        let mut names = qb.separated(", ");
        for tag in &filter.tags {
            names.push_bind(tag.as_str());
        }
        qb.push("))");
    }
    super::push_search(qb, &["d.title", "d.description"], filter.search.as_deref());
}

pub async fn list(pool: &SqlitePool, filter: &DocumentFilter, page: Pagination) -> Result<(Vec<Document>, i64)> {
    let mut count_qb = QueryBuilder::new("SELECT COUNT(*)");
    push_filter(&mut count_qb, filter);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let mut qb = QueryBuilder::new(format!("SELECT {}", COLUMNS));
    push_filter(&mut qb, filter);
    qb.push(" ORDER BY ")
        .push(filter.order_by.column())
        .push(if filter.order_desc { " DESC" } else { " ASC" })
        .push(", d.document_id DESC LIMIT ")
        .push_bind(page.per_page)
        .push(" OFFSET ")
        .push_bind(page.offset);
    Ok((qb.build_query_as().fetch_all(pool).await?, total))
}

/// Tags of several documents at once
pub async fn tags_for(pool: &SqlitePool, document_ids: &[i64]) -> Result<HashMap<i64, Vec<Tag>>> {
    let mut map: HashMap<i64, Vec<Tag>> = HashMap::new();
    if document_ids.is_empty() {
        return Ok(map);
    }

    #[derive(FromRow)]
    struct Row {
        document_id: i64,
        #[sqlx(flatten)]
        tag: Tag,
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT dt.document_id, t.tag_id, t.tag_name, t.created_at FROM document_tags dt \
         JOIN tags t ON t.tag_id = dt.tag_id WHERE dt.document_id IN (",
    );
    let mut ids = qb.separated(", ");
    for id in document_ids {
        ids.push_bind(*id);
    }
    qb.push(") ORDER BY t.tag_name");
    let rows: Vec<Row> = qb.build_query_as().fetch_all(pool).await?;
    for row in rows {
        map.entry(row.document_id).or_default().push(row.tag);
    }
    Ok(map)
}

pub async fn count_all(pool: &SqlitePool) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM documents").fetch_one(pool).await
}

pub async fn count_approved_by_user(pool: &SqlitePool, user_id: i64) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE user_id = ? AND status = 'approved'")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

/// Insert the document and its tags in one transaction
pub async fn create(pool: &SqlitePool, doc: NewDocument, tags: &[String]) -> Result<Document> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();
    let document_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO documents (title, description, file_path, file_size, file_type, subject_id, user_id, status,
                               view_count, download_count, like_count, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 0, 0, ?, ?)
        RETURNING document_id
        "#,
    )
    .bind(doc.title)
    .bind(doc.description)
    .bind(doc.file_path)
    .bind(doc.file_size)
    .bind(doc.file_type)
    .bind(doc.subject_id)
    .bind(doc.user_id)
    .bind(doc.status)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;
    super::tags::attach(&mut tx, document_id, tags).await?;

    let created = sqlx::query_as(&format!("SELECT {} FROM documents d WHERE d.document_id = ?", COLUMNS))
        .bind(document_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(created)
}

/// Update columns and, when given, replace the tag set
pub async fn update(
    pool: &SqlitePool,
    document_id: i64,
    changes: DocumentChanges,
    tags: Option<&[String]>,
) -> Result<Document> {
    let mut tx = pool.begin().await?;
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE documents SET updated_at = ");
    qb.push_bind(Utc::now());
    if let Some(title) = changes.title {
        qb.push(", title = ").push_bind(title);
    }
    if let Some(description) = changes.description {
        qb.push(", description = ").push_bind(description);
    }
    if let Some(status) = changes.status {
        qb.push(", status = ").push_bind(status);
    }
    qb.push(" WHERE document_id = ").push_bind(document_id);
    if qb.build().execute(&mut *tx).await?.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound);
    }
    if let Some(tags) = tags {
        super::tags::replace(&mut tx, document_id, tags).await?;
    }
    let updated = sqlx::query_as(&format!("SELECT {} FROM documents d WHERE d.document_id = ?", COLUMNS))
        .bind(document_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(updated)
}

pub async fn set_status(pool: &SqlitePool, document_id: i64, status: ContentStatus) -> Result<Document> {
    update(
        pool,
        document_id,
        DocumentChanges {
            status: Some(status),
            ..Default::default()
        },
        None,
    )
    .await
}

pub async fn delete(pool: &SqlitePool, document_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM documents WHERE document_id = ?")
        .bind(document_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Bump the matching counter and append a history row
pub async fn record_access(pool: &SqlitePool, document_id: i64, user_id: i64, action: HistoryAction) -> Result<()> {
    let column = match action {
        HistoryAction::View => "view_count",
        HistoryAction::Download => "download_count",
    };
    let mut tx = pool.begin().await?;
    sqlx::query(&format!(
        "UPDATE documents SET {column} = {column} + 1 WHERE document_id = ?"
    ))
    .bind(document_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("INSERT INTO document_history (document_id, user_id, action, created_at) VALUES (?, ?, ?, ?)")
        .bind(document_id)
        .bind(user_id)
        .bind(action)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
    tx.commit().await
}

pub async fn is_liked(pool: &SqlitePool, document_id: i64, user_id: i64) -> Result<bool> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM document_likes WHERE document_id = ? AND user_id = ?)")
        .bind(document_id)
        .bind(user_id)
        .fetch_one(pool)
        .await
}

/// Recount `like_count` from the likes table inside `tx`
async fn refresh_like_count(tx: &mut sqlx::SqliteConnection, document_id: i64) -> Result<i64> {
    sqlx::query_scalar(
        "UPDATE documents SET like_count = (SELECT COUNT(*) FROM document_likes WHERE document_id = ?)
         WHERE document_id = ? RETURNING like_count",
    )
    .bind(document_id)
    .bind(document_id)
    .fetch_one(&mut *tx)
    .await
}

/// Like a document; liking twice is a no-op
pub async fn like(pool: &SqlitePool, document_id: i64, user_id: i64) -> Result<LikeState> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO document_likes (document_id, user_id, created_at) VALUES (?, ?, ?)
         ON CONFLICT (document_id, user_id) DO NOTHING",
    )
    .bind(document_id)
    .bind(user_id)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;
    let like_count = refresh_like_count(&mut tx, document_id).await?;
    tx.commit().await?;
    Ok(LikeState { liked: true, like_count })
}

pub async fn unlike(pool: &SqlitePool, document_id: i64, user_id: i64) -> Result<LikeState> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM document_likes WHERE document_id = ? AND user_id = ?")
        .bind(document_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    let like_count = refresh_like_count(&mut tx, document_id).await?;
    tx.commit().await?;
    Ok(LikeState { liked: false, like_count })
}

pub async fn stats(pool: &SqlitePool, document: &Document, user_id: Option<i64>) -> Result<DocumentStats> {
    let comment_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE document_id = ?")
        .bind(document.document_id)
        .fetch_one(pool)
        .await?;
    let is_liked = match user_id {
        Some(user_id) => is_liked(pool, document.document_id, user_id).await?,
        None => false,
    };
    Ok(DocumentStats {
        document_id: document.document_id,
        view_count: document.view_count,
        download_count: document.download_count,
        like_count: document.like_count,
        comment_count,
        is_liked,
    })
}

/// Average of scored ratings (likes without a score are excluded)
pub async fn rating_summary(pool: &SqlitePool, document_id: i64) -> Result<RatingSummary> {
    sqlx::query_as(
        "SELECT COALESCE(AVG(score), 0.0) AS average_rating, COUNT(*) AS rating_count
         FROM ratings WHERE document_id = ? AND score > 0",
    )
    .bind(document_id)
    .fetch_one(pool)
    .await
}

//! Document comment queries

use chrono::Utc;
use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Result, Sqlite, SqlitePool};
use udulib_common::models::{Comment, ContentStatus};

use crate::pagination::Pagination;

const COLUMNS: &str = "comment_id, content, user_id, document_id, parent_comment_id, status, created_at, updated_at";

/// Comment row joined with its author's display fields
#[derive(Debug, Serialize, FromRow)]
pub struct CommentWithAuthor {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub comment: Comment,
    pub username: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Default)]
pub struct CommentFilter {
    pub document_id: Option<i64>,
    pub user_id: Option<i64>,
    pub status: Option<ContentStatus>,
}

pub async fn get(pool: &SqlitePool, comment_id: i64) -> Result<Option<Comment>> {
    sqlx::query_as(&format!("SELECT {} FROM comments WHERE comment_id = ?", COLUMNS))
        .bind(comment_id)
        .fetch_optional(pool)
        .await
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &CommentFilter) {
    qb.push(" FROM comments c JOIN users u ON u.user_id = c.user_id WHERE 1=1");
    if let Some(document_id) = filter.document_id {
        qb.push(" AND c.document_id = ").push_bind(document_id);
    }
    if let Some(user_id) = filter.user_id {
        qb.push(" AND c.user_id = ").push_bind(user_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND c.status = ").push_bind(status);
    }
}

pub async fn list(
    pool: &SqlitePool,
    filter: &CommentFilter,
    page: Pagination,
) -> Result<(Vec<CommentWithAuthor>, i64)> {
    let mut count_qb = QueryBuilder::new("SELECT COUNT(*)");
    push_filter(&mut count_qb, filter);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let mut qb = QueryBuilder::new(
        "SELECT c.comment_id, c.content, c.user_id, c.document_id, c.parent_comment_id, c.status, \
         c.created_at, c.updated_at, u.username, u.full_name, u.avatar_url",
    );
    push_filter(&mut qb, filter);
    qb.push(" ORDER BY c.created_at DESC, c.comment_id DESC LIMIT ")
        .push_bind(page.per_page)
        .push(" OFFSET ")
        .push_bind(page.offset);
    Ok((qb.build_query_as().fetch_all(pool).await?, total))
}

pub async fn create(
    pool: &SqlitePool,
    document_id: i64,
    user_id: i64,
    content: &str,
    parent_comment_id: Option<i64>,
) -> Result<Comment> {
    let now = Utc::now();
    sqlx::query_as(&format!(
        "INSERT INTO comments (content, user_id, document_id, parent_comment_id, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {}",
        COLUMNS
    ))
    .bind(content)
    .bind(user_id)
    .bind(document_id)
    .bind(parent_comment_id)
    .bind(ContentStatus::Approved)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub async fn update(
    pool: &SqlitePool,
    comment_id: i64,
    content: Option<String>,
    status: Option<ContentStatus>,
) -> Result<Comment> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE comments SET updated_at = ");
    qb.push_bind(Utc::now());
    if let Some(content) = content {
        qb.push(", content = ").push_bind(content);
    }
    if let Some(status) = status {
        qb.push(", status = ").push_bind(status);
    }
    qb.push(" WHERE comment_id = ").push_bind(comment_id);
    qb.push(" RETURNING ").push(COLUMNS);
    qb.build_query_as().fetch_one(pool).await
}

pub async fn delete(pool: &SqlitePool, comment_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM comments WHERE comment_id = ?")
        .bind(comment_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::documents::{self, NewDocument};
    use crate::pagination::PageParams;
    use udulib_common::db::connect_in_memory;
    use udulib_common::models::FileType;

    async fn seed_document(pool: &SqlitePool) -> i64 {
        sqlx::query(
            "INSERT INTO users (username, email, password_hash, full_name, created_at, updated_at)
                VALUES ('ana', 'ana@x', 'h', 'Ana', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO majors (major_name, major_code, created_at, updated_at) VALUES ('IT', 'IT', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO academic_years (year_name, year_order, created_at, updated_at) VALUES ('Y1', 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO subjects (subject_name, subject_code, major_id, year_id, created_at, updated_at) VALUES ('OS', 'OS', 1, 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');",
        )
        .execute(pool)
        .await
        .unwrap();
        let doc = NewDocument {
            title: "Doc".into(),
            description: None,
            file_path: "minio://documents/doc.pdf".into(),
            file_size: 1,
            file_type: FileType::Pdf,
            subject_id: 1,
            user_id: 1,
            status: ContentStatus::Approved,
        };
        documents::create(pool, doc, &[]).await.unwrap().document_id
    }

    #[tokio::test]
    async fn test_replies_cascade_with_parent() {
        let pool = connect_in_memory().await.unwrap();
        let document_id = seed_document(&pool).await;

        let parent = create(&pool, document_id, 1, "first", None).await.unwrap();
        create(&pool, document_id, 1, "reply", Some(parent.comment_id)).await.unwrap();

        let filter = CommentFilter {
            document_id: Some(document_id),
            ..Default::default()
        };
        let page = PageParams::default().validate().unwrap();
        let (rows, total) = list(&pool, &filter, page).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows[0].username, "ana");

        assert!(delete(&pool, parent.comment_id).await.unwrap());
        assert_eq!(list(&pool, &filter, page).await.unwrap().1, 0);
    }

    #[tokio::test]
    async fn test_status_filter() {
        let pool = connect_in_memory().await.unwrap();
        let document_id = seed_document(&pool).await;
        let c = create(&pool, document_id, 1, "hidden", None).await.unwrap();
        update(&pool, c.comment_id, None, Some(ContentStatus::Rejected)).await.unwrap();

        let filter = CommentFilter {
            status: Some(ContentStatus::Approved),
            ..Default::default()
        };
        let (_, total) = list(&pool, &filter, PageParams::default().validate().unwrap()).await.unwrap();
        assert_eq!(total, 0);
    }
}

//! Forum reply queries

use chrono::Utc;
use sqlx::{QueryBuilder, Result, Sqlite, SqlitePool};
use udulib_common::models::{ContentStatus, ForumReply};

use crate::pagination::Pagination;

const COLUMNS: &str = "reply_id, post_id, user_id, parent_reply_id, content, status, created_at, updated_at";

#[derive(Debug, Default)]
pub struct ReplyFilter {
    pub post_id: Option<i64>,
    pub user_id: Option<i64>,
    pub status: Option<ContentStatus>,
}

pub async fn get(pool: &SqlitePool, reply_id: i64) -> Result<Option<ForumReply>> {
    sqlx::query_as(&format!("SELECT {} FROM forum_replies WHERE reply_id = ?", COLUMNS))
        .bind(reply_id)
        .fetch_optional(pool)
        .await
}

/// Direct children of a reply, oldest first
pub async fn children(pool: &SqlitePool, reply_id: i64) -> Result<Vec<ForumReply>> {
    sqlx::query_as(&format!(
        "SELECT {} FROM forum_replies WHERE parent_reply_id = ? ORDER BY created_at, reply_id",
        COLUMNS
    ))
    .bind(reply_id)
    .fetch_all(pool)
    .await
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ReplyFilter) {
    qb.push(" FROM forum_replies WHERE 1=1");
    if let Some(post_id) = filter.post_id {
        qb.push(" AND post_id = ").push_bind(post_id);
    }
    if let Some(user_id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
}

pub async fn list(pool: &SqlitePool, filter: &ReplyFilter, page: Pagination) -> Result<(Vec<ForumReply>, i64)> {
    let mut count_qb = QueryBuilder::new("SELECT COUNT(*)");
    push_filter(&mut count_qb, filter);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let mut qb = QueryBuilder::new(format!("SELECT {}", COLUMNS));
    push_filter(&mut qb, filter);
    qb.push(" ORDER BY created_at, reply_id LIMIT ")
        .push_bind(page.per_page)
        .push(" OFFSET ")
        .push_bind(page.offset);
    Ok((qb.build_query_as().fetch_all(pool).await?, total))
}

pub async fn create(
    pool: &SqlitePool,
    post_id: i64,
    user_id: i64,
    content: &str,
    parent_reply_id: Option<i64>,
) -> Result<ForumReply> {
    let now = Utc::now();
    sqlx::query_as(&format!(
        "INSERT INTO forum_replies (post_id, user_id, parent_reply_id, content, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {}",
        COLUMNS
    ))
    .bind(post_id)
    .bind(user_id)
    .bind(parent_reply_id)
    .bind(content)
    .bind(ContentStatus::Approved)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub async fn update(
    pool: &SqlitePool,
    reply_id: i64,
    content: Option<String>,
    status: Option<ContentStatus>,
) -> Result<ForumReply> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE forum_replies SET updated_at = ");
    qb.push_bind(Utc::now());
    if let Some(content) = content {
        qb.push(", content = ").push_bind(content);
    }
    if let Some(status) = status {
        qb.push(", status = ").push_bind(status);
    }
    qb.push(" WHERE reply_id = ").push_bind(reply_id);
    qb.push(" RETURNING ").push(COLUMNS);
    qb.build_query_as().fetch_one(pool).await
}

pub async fn delete(pool: &SqlitePool, reply_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM forum_replies WHERE reply_id = ?")
        .bind(reply_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::PageParams;
    use udulib_common::db::connect_in_memory;

    #[tokio::test]
    async fn test_children_and_cascade() {
        let pool = connect_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO users (username, email, password_hash, full_name, created_at, updated_at)
                VALUES ('u', 'u@x', 'h', 'U', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO majors (major_name, major_code, created_at, updated_at) VALUES ('IT', 'IT', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO academic_years (year_name, year_order, created_at, updated_at) VALUES ('Y1', 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO subjects (subject_name, subject_code, major_id, year_id, created_at, updated_at) VALUES ('OS', 'OS', 1, 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO forums (subject_id, created_at) VALUES (1, '2024-01-01T00:00:00Z');
             INSERT INTO forum_posts (forum_id, user_id, title, content, created_at, updated_at)
                VALUES (1, 1, 'T', 'C', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');",
        )
        .execute(&pool)
        .await
        .unwrap();

        let root = create(&pool, 1, 1, "root", None).await.unwrap();
        create(&pool, 1, 1, "child", Some(root.reply_id)).await.unwrap();
        assert_eq!(children(&pool, root.reply_id).await.unwrap().len(), 1);

        let filter = ReplyFilter {
            post_id: Some(1),
            ..Default::default()
        };
        let page = PageParams::default().validate().unwrap();
        assert_eq!(list(&pool, &filter, page).await.unwrap().1, 2);

        delete(&pool, root.reply_id).await.unwrap();
        assert_eq!(list(&pool, &filter, page).await.unwrap().1, 0);
    }
}

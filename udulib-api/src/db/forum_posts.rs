//! Forum post queries

use chrono::Utc;
use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Result, Sqlite, SqliteConnection, SqlitePool};
use udulib_common::models::{ContentStatus, ForumPost};

use crate::db::documents::LikeState;
use crate::pagination::Pagination;

const COLUMNS: &str = "post_id, forum_id, user_id, title, content, status, views, like_count, created_at, updated_at";

#[derive(Debug, Serialize, FromRow)]
pub struct PostSummary {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub post: ForumPost,
    pub username: String,
    pub reply_count: i64,
}

#[derive(Debug, Default)]
pub struct PostFilter {
    pub forum_id: Option<i64>,
    pub user_id: Option<i64>,
    pub status: Option<ContentStatus>,
    pub search: Option<String>,
}

pub async fn get(pool: &SqlitePool, post_id: i64) -> Result<Option<ForumPost>> {
    sqlx::query_as(&format!("SELECT {} FROM forum_posts WHERE post_id = ?", COLUMNS))
        .bind(post_id)
        .fetch_optional(pool)
        .await
}

/// Increment the view counter and return the updated post
pub async fn view(pool: &SqlitePool, post_id: i64) -> Result<Option<ForumPost>> {
    sqlx::query_as(&format!(
        "UPDATE forum_posts SET views = views + 1 WHERE post_id = ? RETURNING {}",
        COLUMNS
    ))
    .bind(post_id)
    .fetch_optional(pool)
    .await
}

fn push_filter<'a>(qb: &mut QueryBuilder<'a, Sqlite>, filter: &'a PostFilter) {
    qb.push(" FROM forum_posts p JOIN users u ON u.user_id = p.user_id WHERE 1=1");
    if let Some(forum_id) = filter.forum_id {
        qb.push(" AND p.forum_id = ").push_bind(forum_id);
    }
    if let Some(user_id) = filter.user_id {
        qb.push(" AND p.user_id = ").push_bind(user_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND p.status = ").push_bind(status);
    }
    super::push_search(qb, &["p.title", "p.content"], filter.search.as_deref());
}

pub async fn list(pool: &SqlitePool, filter: &PostFilter, page: Pagination) -> Result<(Vec<PostSummary>, i64)> {
    let mut count_qb = QueryBuilder::new("SELECT COUNT(*)");
    push_filter(&mut count_qb, filter);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let mut qb = QueryBuilder::new(
        "SELECT p.post_id, p.forum_id, p.user_id, p.title, p.content, p.status, p.views, p.like_count, \
         p.created_at, p.updated_at, u.username, \
         (SELECT COUNT(*) FROM forum_replies r WHERE r.post_id = p.post_id) AS reply_count",
    );
    push_filter(&mut qb, filter);
    qb.push(" ORDER BY p.created_at DESC, p.post_id DESC LIMIT ")
        .push_bind(page.per_page)
        .push(" OFFSET ")
        .push_bind(page.offset);
    Ok((qb.build_query_as().fetch_all(pool).await?, total))
}

pub async fn create(pool: &SqlitePool, forum_id: i64, user_id: i64, title: &str, content: &str) -> Result<ForumPost> {
    let now = Utc::now();
    sqlx::query_as(&format!(
        "INSERT INTO forum_posts (forum_id, user_id, title, content, status, views, like_count, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, 0, 0, ?, ?) RETURNING {}",
        COLUMNS
    ))
    .bind(forum_id)
    .bind(user_id)
    .bind(title)
    .bind(content)
    .bind(ContentStatus::Approved)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub async fn update(
    pool: &SqlitePool,
    post_id: i64,
    title: Option<String>,
    content: Option<String>,
    status: Option<ContentStatus>,
) -> Result<ForumPost> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE forum_posts SET updated_at = ");
    qb.push_bind(Utc::now());
    if let Some(title) = title {
        qb.push(", title = ").push_bind(title);
    }
    if let Some(content) = content {
        qb.push(", content = ").push_bind(content);
    }
    if let Some(status) = status {
        qb.push(", status = ").push_bind(status);
    }
    qb.push(" WHERE post_id = ").push_bind(post_id);
    qb.push(" RETURNING ").push(COLUMNS);
    qb.build_query_as().fetch_one(pool).await
}

pub async fn delete(pool: &SqlitePool, post_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM forum_posts WHERE post_id = ?")
        .bind(post_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

async fn refresh_like_count(conn: &mut SqliteConnection, post_id: i64) -> Result<i64> {
    sqlx::query_scalar(
        "UPDATE forum_posts SET like_count = (SELECT COUNT(*) FROM forum_post_likes WHERE post_id = ?)
         WHERE post_id = ? RETURNING like_count",
    )
    .bind(post_id)
    .bind(post_id)
    .fetch_one(&mut *conn)
    .await
}

pub async fn like(pool: &SqlitePool, post_id: i64, user_id: i64) -> Result<LikeState> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO forum_post_likes (post_id, user_id, created_at) VALUES (?, ?, ?)
         ON CONFLICT (post_id, user_id) DO NOTHING",
    )
    .bind(post_id)
    .bind(user_id)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;
    let like_count = refresh_like_count(&mut tx, post_id).await?;
    tx.commit().await?;
    Ok(LikeState { liked: true, like_count })
}

pub async fn unlike(pool: &SqlitePool, post_id: i64, user_id: i64) -> Result<LikeState> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM forum_post_likes WHERE post_id = ? AND user_id = ?")
        .bind(post_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    let like_count = refresh_like_count(&mut tx, post_id).await?;
    tx.commit().await?;
    Ok(LikeState { liked: false, like_count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::PageParams;
    use udulib_common::db::connect_in_memory;

    async fn seed(pool: &SqlitePool) {
        sqlx::query(
            "INSERT INTO users (username, email, password_hash, full_name, created_at, updated_at)
                VALUES ('poster', 'p@x', 'h', 'P', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO majors (major_name, major_code, created_at, updated_at) VALUES ('IT', 'IT', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO academic_years (year_name, year_order, created_at, updated_at) VALUES ('Y1', 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO subjects (subject_name, subject_code, major_id, year_id, created_at, updated_at) VALUES ('OS', 'OS', 1, 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO forums (subject_id, created_at) VALUES (1, '2024-01-01T00:00:00Z');",
        )
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_views_likes_and_search() {
        let pool = connect_in_memory().await.unwrap();
        seed(&pool).await;
        let post = create(&pool, 1, 1, "Scheduling question", "How does CFS work?").await.unwrap();
        create(&pool, 1, 1, "Exam date", "When?").await.unwrap();

        assert_eq!(view(&pool, post.post_id).await.unwrap().unwrap().views, 1);
        assert!(view(&pool, 999).await.unwrap().is_none());

        assert_eq!(like(&pool, post.post_id, 1).await.unwrap().like_count, 1);
        assert_eq!(like(&pool, post.post_id, 1).await.unwrap().like_count, 1);
        assert_eq!(unlike(&pool, post.post_id, 1).await.unwrap().like_count, 0);

        let filter = PostFilter {
            search: Some("cfs".into()),
            ..Default::default()
        };
        let (rows, total) = list(&pool, &filter, PageParams::default().validate().unwrap()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].post.post_id, post.post_id);
        assert_eq!(rows[0].reply_count, 0);
        assert_eq!(rows[0].username, "poster");
    }
}

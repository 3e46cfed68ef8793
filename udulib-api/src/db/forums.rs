//! Forum queries; one forum per subject

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Result, Sqlite, SqlitePool};
use udulib_common::models::Forum;

use crate::pagination::Pagination;

const COLUMNS: &str = "forum_id, subject_id, description, created_at";

const SUMMARY_SELECT: &str = r#"
    SELECT f.forum_id, f.subject_id, s.subject_name, f.description, f.created_at,
           (SELECT COUNT(*) FROM forum_posts p WHERE p.forum_id = f.forum_id) AS post_count
    FROM forums f
    JOIN subjects s ON s.subject_id = f.subject_id
"#;

#[derive(Debug, Serialize, FromRow)]
pub struct ForumSummary {
    pub forum_id: i64,
    pub subject_id: i64,
    pub subject_name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub post_count: i64,
}

pub async fn get(pool: &SqlitePool, forum_id: i64) -> Result<Option<Forum>> {
    sqlx::query_as(&format!("SELECT {} FROM forums WHERE forum_id = ?", COLUMNS))
        .bind(forum_id)
        .fetch_optional(pool)
        .await
}

pub async fn summary(pool: &SqlitePool, forum_id: i64) -> Result<Option<ForumSummary>> {
    sqlx::query_as(&format!("{} WHERE f.forum_id = ?", SUMMARY_SELECT))
        .bind(forum_id)
        .fetch_optional(pool)
        .await
}

pub async fn summary_by_subject(pool: &SqlitePool, subject_id: i64) -> Result<Option<ForumSummary>> {
    sqlx::query_as(&format!("{} WHERE f.subject_id = ?", SUMMARY_SELECT))
        .bind(subject_id)
        .fetch_optional(pool)
        .await
}

pub async fn list(pool: &SqlitePool, page: Pagination) -> Result<(Vec<ForumSummary>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM forums").fetch_one(pool).await?;
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SUMMARY_SELECT);
    qb.push(" ORDER BY s.subject_name, f.forum_id LIMIT ")
        .push_bind(page.per_page)
        .push(" OFFSET ")
        .push_bind(page.offset);
    Ok((qb.build_query_as().fetch_all(pool).await?, total))
}

pub async fn create(pool: &SqlitePool, subject_id: i64, description: Option<&str>) -> Result<Forum> {
    sqlx::query_as(&format!(
        "INSERT INTO forums (subject_id, description, created_at) VALUES (?, ?, ?) RETURNING {}",
        COLUMNS
    ))
    .bind(subject_id)
    .bind(description)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

pub async fn set_description(pool: &SqlitePool, forum_id: i64, description: Option<&str>) -> Result<Forum> {
    sqlx::query_as(&format!(
        "UPDATE forums SET description = ? WHERE forum_id = ? RETURNING {}",
        COLUMNS
    ))
    .bind(description)
    .bind(forum_id)
    .fetch_one(pool)
    .await
}

pub async fn delete(pool: &SqlitePool, forum_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM forums WHERE forum_id = ?")
        .bind(forum_id)
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
    async fn test_one_forum_per_subject() {
        let pool = connect_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO majors (major_name, major_code, created_at, updated_at) VALUES ('IT', 'IT', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO academic_years (year_name, year_order, created_at, updated_at) VALUES ('Y1', 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO subjects (subject_name, subject_code, major_id, year_id, created_at, updated_at) VALUES ('Compilers', 'CC', 1, 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');",
        )
        .execute(&pool)
        .await
        .unwrap();

        let forum = create(&pool, 1, Some("Q&A")).await.unwrap();
        assert!(create(&pool, 1, None).await.is_err());

        let summary = summary_by_subject(&pool, 1).await.unwrap().unwrap();
        assert_eq!(summary.forum_id, forum.forum_id);
        assert_eq!(summary.subject_name, "Compilers");
        assert_eq!(summary.post_count, 0);

        let (rows, total) = list(&pool, PageParams::default().validate().unwrap()).await.unwrap();
        assert_eq!((rows.len(), total), (1, 1));
    }
}

//! Rating queries

use chrono::Utc;
use sqlx::{QueryBuilder, Result, Sqlite, SqlitePool};
use udulib_common::models::Rating;

use crate::pagination::Pagination;

const COLUMNS: &str = "rating_id, document_id, user_id, score, created_at, updated_at";

pub async fn get(pool: &SqlitePool, rating_id: i64) -> Result<Option<Rating>> {
    sqlx::query_as(&format!("SELECT {} FROM ratings WHERE rating_id = ?", COLUMNS))
        .bind(rating_id)
        .fetch_optional(pool)
        .await
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, document_id: Option<i64>, user_id: Option<i64>) {
    qb.push(" FROM ratings WHERE 1=1");
    if let Some(document_id) = document_id {
        qb.push(" AND document_id = ").push_bind(document_id);
    }
    if let Some(user_id) = user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
}

pub async fn list(
    pool: &SqlitePool,
    document_id: Option<i64>,
    user_id: Option<i64>,
    page: Pagination,
) -> Result<(Vec<Rating>, i64)> {
    let mut count_qb = QueryBuilder::new("SELECT COUNT(*)");
    push_filter(&mut count_qb, document_id, user_id);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let mut qb = QueryBuilder::new(format!("SELECT {}", COLUMNS));
    push_filter(&mut qb, document_id, user_id);
    qb.push(" ORDER BY updated_at DESC, rating_id DESC LIMIT ")
        .push_bind(page.per_page)
        .push(" OFFSET ")
        .push_bind(page.offset);
    Ok((qb.build_query_as().fetch_all(pool).await?, total))
}

/// Create the caller's rating or overwrite its score
pub async fn upsert(pool: &SqlitePool, document_id: i64, user_id: i64, score: i64) -> Result<Rating> {
    let now = Utc::now();
    sqlx::query_as(&format!(
        "INSERT INTO ratings (document_id, user_id, score, created_at, updated_at) VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (user_id, document_id) DO UPDATE SET score = excluded.score, updated_at = excluded.updated_at
         RETURNING {}",
        COLUMNS
    ))
    .bind(document_id)
    .bind(user_id)
    .bind(score)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub async fn set_score(pool: &SqlitePool, rating_id: i64, score: i64) -> Result<Rating> {
    sqlx::query_as(&format!(
        "UPDATE ratings SET score = ?, updated_at = ? WHERE rating_id = ? RETURNING {}",
        COLUMNS
    ))
    .bind(score)
    .bind(Utc::now())
    .bind(rating_id)
    .fetch_one(pool)
    .await
}

pub async fn delete(pool: &SqlitePool, rating_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM ratings WHERE rating_id = ?")
        .bind(rating_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::documents;
    use crate::pagination::PageParams;
    use udulib_common::db::connect_in_memory;

    #[tokio::test]
    async fn test_upsert_keeps_one_rating_per_user() {
        let pool = connect_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO users (username, email, password_hash, full_name, created_at, updated_at)
                VALUES ('r', 'r@x', 'h', 'R', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO majors (major_name, major_code, created_at, updated_at) VALUES ('IT', 'IT', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO academic_years (year_name, year_order, created_at, updated_at) VALUES ('Y1', 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO subjects (subject_name, subject_code, major_id, year_id, created_at, updated_at) VALUES ('OS', 'OS', 1, 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO documents (title, file_path, subject_id, user_id, created_at, updated_at)
                VALUES ('D', 'minio://documents/d.pdf', 1, 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');",
        )
        .execute(&pool)
        .await
        .unwrap();

        let first = upsert(&pool, 1, 1, 3).await.unwrap();
        let second = upsert(&pool, 1, 1, 5).await.unwrap();
        assert_eq!(first.rating_id, second.rating_id);
        assert_eq!(second.score, 5);

        let (_, total) = list(&pool, Some(1), None, PageParams::default().validate().unwrap())
            .await
            .unwrap();
        assert_eq!(total, 1);

        // A zero score counts as a like and is left out of the average
        set_score(&pool, first.rating_id, 0).await.unwrap();
        let summary = documents::rating_summary(&pool, 1).await.unwrap();
        assert_eq!(summary.rating_count, 0);
        assert_eq!(summary.average_rating, 0.0);

        assert!(upsert(&pool, 1, 1, 6).await.is_err());
    }
}

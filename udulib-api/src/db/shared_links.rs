//! Shared link queries

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Result, Sqlite, SqlitePool};
use udulib_common::models::SharedLink;

use crate::pagination::Pagination;

const COLUMNS: &str = "link_id, document_id, user_id, share_token, expiration_date, created_at";

pub async fn get(pool: &SqlitePool, link_id: i64) -> Result<Option<SharedLink>> {
    sqlx::query_as(&format!("SELECT {} FROM shared_links WHERE link_id = ?", COLUMNS))
        .bind(link_id)
        .fetch_optional(pool)
        .await
}

pub async fn get_by_token(pool: &SqlitePool, token: &str) -> Result<Option<SharedLink>> {
    sqlx::query_as(&format!("SELECT {} FROM shared_links WHERE share_token = ?", COLUMNS))
        .bind(token)
        .fetch_optional(pool)
        .await
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, user_id: Option<i64>, document_id: Option<i64>) {
    qb.push(" FROM shared_links WHERE 1=1");
    if let Some(user_id) = user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(document_id) = document_id {
        qb.push(" AND document_id = ").push_bind(document_id);
    }
}

pub async fn list(
    pool: &SqlitePool,
    user_id: Option<i64>,
    document_id: Option<i64>,
    page: Pagination,
) -> Result<(Vec<SharedLink>, i64)> {
    let mut count_qb = QueryBuilder::new("SELECT COUNT(*)");
    push_filter(&mut count_qb, user_id, document_id);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let mut qb = QueryBuilder::new(format!("SELECT {}", COLUMNS));
    push_filter(&mut qb, user_id, document_id);
    qb.push(" ORDER BY created_at DESC, link_id DESC LIMIT ")
        .push_bind(page.per_page)
        .push(" OFFSET ")
        .push_bind(page.offset);
    Ok((qb.build_query_as().fetch_all(pool).await?, total))
}

pub async fn create(
    pool: &SqlitePool,
    document_id: i64,
    user_id: i64,
    token: &str,
    expiration_date: Option<DateTime<Utc>>,
) -> Result<SharedLink> {
    sqlx::query_as(&format!(
        "INSERT INTO shared_links (document_id, user_id, share_token, expiration_date, created_at)
         VALUES (?, ?, ?, ?, ?) RETURNING {}",
        COLUMNS
    ))
    .bind(document_id)
    .bind(user_id)
    .bind(token)
    .bind(expiration_date)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

pub async fn set_expiration(
    pool: &SqlitePool,
    link_id: i64,
    expiration_date: Option<DateTime<Utc>>,
) -> Result<SharedLink> {
    sqlx::query_as(&format!(
        "UPDATE shared_links SET expiration_date = ? WHERE link_id = ? RETURNING {}",
        COLUMNS
    ))
    .bind(expiration_date)
    .bind(link_id)
    .fetch_one(pool)
    .await
}

pub async fn delete(pool: &SqlitePool, link_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM shared_links WHERE link_id = ?")
        .bind(link_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use udulib_common::db::connect_in_memory;

    #[tokio::test]
    async fn test_token_lookup_and_expiry_update() {
        let pool = connect_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO users (username, email, password_hash, full_name, created_at, updated_at)
                VALUES ('s', 's@x', 'h', 'S', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO majors (major_name, major_code, created_at, updated_at) VALUES ('IT', 'IT', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO academic_years (year_name, year_order, created_at, updated_at) VALUES ('Y1', 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO subjects (subject_name, subject_code, major_id, year_id, created_at, updated_at) VALUES ('OS', 'OS', 1, 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO documents (title, file_path, subject_id, user_id, created_at, updated_at)
                VALUES ('D', 'minio://documents/d.pdf', 1, 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');",
        )
        .execute(&pool)
        .await
        .unwrap();

        let link = create(&pool, 1, 1, "tok-123", None).await.unwrap();
        assert!(create(&pool, 1, 1, "tok-123", None).await.is_err());
        assert_eq!(get_by_token(&pool, "tok-123").await.unwrap().unwrap().link_id, link.link_id);

        let past = Utc::now() - chrono::Duration::hours(1);
        let updated = set_expiration(&pool, link.link_id, Some(past)).await.unwrap();
        assert!(updated.is_expired(Utc::now()));
    }
}

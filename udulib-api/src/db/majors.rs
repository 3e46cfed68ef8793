//! Major queries

use chrono::Utc;
use sqlx::{QueryBuilder, Result, Sqlite, SqlitePool};
use udulib_common::models::Major;

use crate::pagination::Pagination;

const COLUMNS: &str = "major_id, major_name, major_code, description, image_url, created_at, updated_at";

pub struct MajorFields {
    pub major_name: String,
    pub major_code: String,
    pub description: Option<String>,
}

#[derive(Debug, Default)]
pub struct MajorChanges {
    pub major_name: Option<String>,
    pub major_code: Option<String>,
    pub description: Option<String>,
}

pub async fn get(pool: &SqlitePool, major_id: i64) -> Result<Option<Major>> {
    sqlx::query_as(&format!("SELECT {} FROM majors WHERE major_id = ?", COLUMNS))
        .bind(major_id)
        .fetch_optional(pool)
        .await
}

pub async fn get_by_code(pool: &SqlitePool, code: &str) -> Result<Option<Major>> {
    sqlx::query_as(&format!("SELECT {} FROM majors WHERE major_code = ?", COLUMNS))
        .bind(code)
        .fetch_optional(pool)
        .await
}

pub async fn count(pool: &SqlitePool, search: Option<&str>) -> Result<i64> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM majors WHERE 1=1");
    super::push_search(&mut qb, &["major_name", "major_code"], search);
    qb.build_query_scalar().fetch_one(pool).await
}

pub async fn list(pool: &SqlitePool, search: Option<&str>, page: Pagination) -> Result<(Vec<Major>, i64)> {
    let total = count(pool, search).await?;
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("SELECT {} FROM majors WHERE 1=1", COLUMNS));
    super::push_search(&mut qb, &["major_name", "major_code"], search);
    qb.push(" ORDER BY major_name LIMIT ")
        .push_bind(page.per_page)
        .push(" OFFSET ")
        .push_bind(page.offset);
    Ok((qb.build_query_as().fetch_all(pool).await?, total))
}

pub async fn create(pool: &SqlitePool, fields: MajorFields) -> Result<Major> {
    let now = Utc::now();
    sqlx::query_as(&format!(
        "INSERT INTO majors (major_name, major_code, description, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?) RETURNING {}",
        COLUMNS
    ))
    .bind(fields.major_name)
    .bind(fields.major_code)
    .bind(fields.description)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub async fn update(pool: &SqlitePool, major_id: i64, changes: MajorChanges) -> Result<Major> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE majors SET updated_at = ");
    qb.push_bind(Utc::now());
    if let Some(name) = changes.major_name {
        qb.push(", major_name = ").push_bind(name);
    }
    if let Some(code) = changes.major_code {
        qb.push(", major_code = ").push_bind(code);
    }
    if let Some(description) = changes.description {
        qb.push(", description = ").push_bind(description);
    }
    qb.push(" WHERE major_id = ").push_bind(major_id);
    qb.push(" RETURNING ").push(COLUMNS);
    qb.build_query_as().fetch_one(pool).await
}

pub async fn set_image(pool: &SqlitePool, major_id: i64, image_url: Option<&str>) -> Result<Major> {
    sqlx::query_as(&format!(
        "UPDATE majors SET image_url = ?, updated_at = ? WHERE major_id = ? RETURNING {}",
        COLUMNS
    ))
    .bind(image_url)
    .bind(Utc::now())
    .bind(major_id)
    .fetch_one(pool)
    .await
}

pub async fn subject_count(pool: &SqlitePool, major_id: i64) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM subjects WHERE major_id = ?")
        .bind(major_id)
        .fetch_one(pool)
        .await
}

pub async fn delete(pool: &SqlitePool, major_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM majors WHERE major_id = ?")
        .bind(major_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::PageParams;
    use udulib_common::db::connect_in_memory;

    fn fields(name: &str, code: &str) -> MajorFields {
        MajorFields {
            major_name: name.to_string(),
            major_code: code.to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_crud_and_search() {
        let pool = connect_in_memory().await.unwrap();
        let it = create(&pool, fields("Information Technology", "IT")).await.unwrap();
        create(&pool, fields("Economics", "EC")).await.unwrap();

        assert_eq!(get_by_code(&pool, "IT").await.unwrap().unwrap().major_id, it.major_id);

        let page = PageParams::default().validate().unwrap();
        let (found, total) = list(&pool, Some("techno"), page).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].major_code, "IT");

        let renamed = update(
            &pool,
            it.major_id,
            MajorChanges {
                description: Some("Software".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(renamed.description.as_deref(), Some("Software"));
        assert_eq!(renamed.major_name, "Information Technology");

        assert!(delete(&pool, it.major_id).await.unwrap());
        assert!(!delete(&pool, it.major_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_code_is_unique_violation() {
        let pool = connect_in_memory().await.unwrap();
        create(&pool, fields("A", "DUP")).await.unwrap();
        let err = create(&pool, fields("B", "DUP")).await.unwrap_err();
        assert!(err.as_database_error().is_some_and(|e| e.is_unique_violation()));
    }
}

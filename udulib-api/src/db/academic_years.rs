//! Academic year queries

use chrono::Utc;
use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Result, Sqlite, SqlitePool};
use udulib_common::models::AcademicYear;

use crate::pagination::Pagination;

const COLUMNS: &str = "year_id, year_name, year_order, created_at, updated_at";

#[derive(Debug, Serialize, FromRow)]
pub struct YearWithSubjectCount {
    pub year_id: i64,
    pub year_name: String,
    pub year_order: i64,
    pub subjects_count: i64,
}

pub async fn get(pool: &SqlitePool, year_id: i64) -> Result<Option<AcademicYear>> {
    sqlx::query_as(&format!("SELECT {} FROM academic_years WHERE year_id = ?", COLUMNS))
        .bind(year_id)
        .fetch_optional(pool)
        .await
}

/// Year with the highest `year_order`
pub async fn latest(pool: &SqlitePool) -> Result<Option<AcademicYear>> {
    sqlx::query_as(&format!(
        "SELECT {} FROM academic_years ORDER BY year_order DESC, year_id DESC LIMIT 1",
        COLUMNS
    ))
    .fetch_optional(pool)
    .await
}

pub async fn list(pool: &SqlitePool, page: Pagination) -> Result<(Vec<AcademicYear>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM academic_years")
        .fetch_one(pool)
        .await?;
    let years = sqlx::query_as(&format!(
        "SELECT {} FROM academic_years ORDER BY year_order, year_id LIMIT ? OFFSET ?",
        COLUMNS
    ))
    .bind(page.per_page)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;
    Ok((years, total))
}

pub async fn list_with_subject_counts(pool: &SqlitePool, page: Pagination) -> Result<(Vec<YearWithSubjectCount>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM academic_years")
        .fetch_one(pool)
        .await?;
    let years = sqlx::query_as(
        r#"
        SELECT y.year_id, y.year_name, y.year_order, COUNT(s.subject_id) AS subjects_count
        FROM academic_years y
        LEFT JOIN subjects s ON s.year_id = y.year_id
        GROUP BY y.year_id
        ORDER BY y.year_order, y.year_id
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(page.per_page)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;
    Ok((years, total))
}

pub async fn create(pool: &SqlitePool, year_name: &str, year_order: i64) -> Result<AcademicYear> {
    let now = Utc::now();
    sqlx::query_as(&format!(
        "INSERT INTO academic_years (year_name, year_order, created_at, updated_at) VALUES (?, ?, ?, ?) RETURNING {}",
        COLUMNS
    ))
    .bind(year_name)
    .bind(year_order)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub async fn update(
    pool: &SqlitePool,
    year_id: i64,
    year_name: Option<String>,
    year_order: Option<i64>,
) -> Result<AcademicYear> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE academic_years SET updated_at = ");
    qb.push_bind(Utc::now());
    if let Some(name) = year_name {
        qb.push(", year_name = ").push_bind(name);
    }
    if let Some(order) = year_order {
        qb.push(", year_order = ").push_bind(order);
    }
    qb.push(" WHERE year_id = ").push_bind(year_id);
    qb.push(" RETURNING ").push(COLUMNS);
    qb.build_query_as().fetch_one(pool).await
}

pub async fn subject_count(pool: &SqlitePool, year_id: i64) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM subjects WHERE year_id = ?")
        .bind(year_id)
        .fetch_one(pool)
        .await
}

pub async fn delete(pool: &SqlitePool, year_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM academic_years WHERE year_id = ?")
        .bind(year_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

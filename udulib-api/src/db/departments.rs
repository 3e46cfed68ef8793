//! Department queries and subject links

use chrono::Utc;
use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Result, Sqlite, SqlitePool};
use udulib_common::models::{Department, Subject};

use crate::pagination::Pagination;

const COLUMNS: &str = "department_id, name, slug, description, created_at, updated_at";

#[derive(Debug, Serialize, FromRow)]
pub struct DepartmentSummary {
    pub department_id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub subjects_count: i64,
}

pub async fn get(pool: &SqlitePool, department_id: i64) -> Result<Option<Department>> {
    sqlx::query_as(&format!("SELECT {} FROM departments WHERE department_id = ?", COLUMNS))
        .bind(department_id)
        .fetch_optional(pool)
        .await
}

pub async fn get_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Department>> {
    sqlx::query_as(&format!("SELECT {} FROM departments WHERE slug = ?", COLUMNS))
        .bind(slug)
        .fetch_optional(pool)
        .await
}

pub async fn list(pool: &SqlitePool, page: Pagination) -> Result<(Vec<DepartmentSummary>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM departments")
        .fetch_one(pool)
        .await?;
    let rows = sqlx::query_as(
        r#"
        SELECT d.department_id, d.name, d.slug, d.description, COUNT(sd.subject_id) AS subjects_count
        FROM departments d
        LEFT JOIN subject_departments sd ON sd.department_id = d.department_id
        GROUP BY d.department_id
        ORDER BY d.name
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(page.per_page)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;
    Ok((rows, total))
}

pub async fn subjects(pool: &SqlitePool, department_id: i64) -> Result<Vec<Subject>> {
    sqlx::query_as(
        r#"
        SELECT s.subject_id, s.subject_name, s.subject_code, s.description, s.major_id, s.year_id,
               s.created_at, s.updated_at
        FROM subjects s
        JOIN subject_departments sd ON sd.subject_id = s.subject_id
        WHERE sd.department_id = ?
        ORDER BY s.subject_name
        "#,
    )
    .bind(department_id)
    .fetch_all(pool)
    .await
}

pub async fn create(pool: &SqlitePool, name: &str, slug: &str, description: Option<&str>) -> Result<Department> {
    let now = Utc::now();
    sqlx::query_as(&format!(
        "INSERT INTO departments (name, slug, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?) RETURNING {}",
        COLUMNS
    ))
    .bind(name)
    .bind(slug)
    .bind(description)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub async fn update(
    pool: &SqlitePool,
    department_id: i64,
    name: Option<String>,
    slug: Option<String>,
    description: Option<String>,
) -> Result<Department> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE departments SET updated_at = ");
    qb.push_bind(Utc::now());
    if let Some(name) = name {
        qb.push(", name = ").push_bind(name);
    }
    if let Some(slug) = slug {
        qb.push(", slug = ").push_bind(slug);
    }
    if let Some(description) = description {
        qb.push(", description = ").push_bind(description);
    }
    qb.push(" WHERE department_id = ").push_bind(department_id);
    qb.push(" RETURNING ").push(COLUMNS);
    qb.build_query_as().fetch_one(pool).await
}

pub async fn delete(pool: &SqlitePool, department_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM departments WHERE department_id = ?")
        .bind(department_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Link a subject; returns false when the link already existed
pub async fn link_subject(pool: &SqlitePool, department_id: i64, subject_id: i64) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO subject_departments (subject_id, department_id) VALUES (?, ?)
         ON CONFLICT (subject_id, department_id) DO NOTHING",
    )
    .bind(subject_id)
    .bind(department_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn unlink_subject(pool: &SqlitePool, department_id: i64, subject_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM subject_departments WHERE subject_id = ? AND department_id = ?")
        .bind(subject_id)
        .bind(department_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Lowercase ASCII slug from a display name
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

//! Tag queries and document-tag links

use chrono::Utc;
use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Result, Sqlite, SqliteConnection, SqlitePool};
use udulib_common::models::Tag;

use crate::pagination::Pagination;

#[derive(Debug, Serialize, FromRow)]
pub struct TagWithCount {
    pub tag_id: i64,
    pub tag_name: String,
    pub document_count: i64,
}

/// Trim tag names, dropping empties and duplicates while keeping order
pub fn normalize_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let name = name.as_ref().trim();
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

pub async fn get(pool: &SqlitePool, tag_id: i64) -> Result<Option<Tag>> {
    sqlx::query_as("SELECT tag_id, tag_name, created_at FROM tags WHERE tag_id = ?")
        .bind(tag_id)
        .fetch_optional(pool)
        .await
}

pub async fn get_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Tag>> {
    sqlx::query_as("SELECT tag_id, tag_name, created_at FROM tags WHERE tag_name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
}

pub async fn list(pool: &SqlitePool, search: Option<&str>, page: Pagination) -> Result<(Vec<Tag>, i64)> {
    let mut count_qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM tags WHERE 1=1");
    super::push_search(&mut count_qb, &["tag_name"], search);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT tag_id, tag_name, created_at FROM tags WHERE 1=1");
    super::push_search(&mut qb, &["tag_name"], search);
    qb.push(" ORDER BY tag_name LIMIT ")
        .push_bind(page.per_page)
        .push(" OFFSET ")
        .push_bind(page.offset);
    Ok((qb.build_query_as().fetch_all(pool).await?, total))
}

pub async fn list_with_counts(pool: &SqlitePool, page: Pagination) -> Result<(Vec<TagWithCount>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags").fetch_one(pool).await?;
    let rows = sqlx::query_as(
        r#"
        SELECT t.tag_id, t.tag_name, COUNT(dt.document_id) AS document_count
        FROM tags t
        LEFT JOIN document_tags dt ON dt.tag_id = t.tag_id
        GROUP BY t.tag_id
        ORDER BY document_count DESC, t.tag_name
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(page.per_page)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;
    Ok((rows, total))
}

pub async fn create(pool: &SqlitePool, name: &str) -> Result<Tag> {
    sqlx::query_as("INSERT INTO tags (tag_name, created_at) VALUES (?, ?) RETURNING tag_id, tag_name, created_at")
        .bind(name)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
}

pub async fn rename(pool: &SqlitePool, tag_id: i64, name: &str) -> Result<Tag> {
    sqlx::query_as("UPDATE tags SET tag_name = ? WHERE tag_id = ? RETURNING tag_id, tag_name, created_at")
        .bind(name)
        .bind(tag_id)
        .fetch_one(pool)
        .await
}

pub async fn delete(pool: &SqlitePool, tag_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tags WHERE tag_id = ?")
        .bind(tag_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Id of the named tag, creating it when missing
pub async fn get_or_create(conn: &mut SqliteConnection, name: &str) -> Result<i64> {
    sqlx::query("INSERT INTO tags (tag_name, created_at) VALUES (?, ?) ON CONFLICT (tag_name) DO NOTHING")
        .bind(name)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
    sqlx::query_scalar("SELECT tag_id FROM tags WHERE tag_name = ?")
        .bind(name)
        .fetch_one(&mut *conn)
        .await
}

/// Attach tags by name, creating missing ones
pub async fn attach(conn: &mut SqliteConnection, document_id: i64, names: &[String]) -> Result<()> {
    for name in names {
        let tag_id = get_or_create(conn, name).await?;
        sqlx::query(
            "INSERT INTO document_tags (document_id, tag_id) VALUES (?, ?)
             ON CONFLICT (document_id, tag_id) DO NOTHING",
        )
        .bind(document_id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Replace every tag of a document
pub async fn replace(conn: &mut SqliteConnection, document_id: i64, names: &[String]) -> Result<()> {
    sqlx::query("DELETE FROM document_tags WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *conn)
        .await?;
    attach(conn, document_id, names).await
}

/// Remove one tag from a document; false when it was not attached
pub async fn detach(pool: &SqlitePool, document_id: i64, name: &str) -> Result<bool> {
    let result = sqlx::query(
        "DELETE FROM document_tags
         WHERE document_id = ? AND tag_id = (SELECT tag_id FROM tags WHERE tag_name = ?)",
    )
    .bind(document_id)
    .bind(name)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn for_document(pool: &SqlitePool, document_id: i64) -> Result<Vec<Tag>> {
    sqlx::query_as(
        r#"
        SELECT t.tag_id, t.tag_name, t.created_at
        FROM tags t
        JOIN document_tags dt ON dt.tag_id = t.tag_id
        WHERE dt.document_id = ?
        ORDER BY t.tag_name
        "#,
    )
    .bind(document_id)
    .fetch_all(pool)
    .await
}

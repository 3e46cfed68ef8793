//! Document access history

use chrono::Utc;
use sqlx::{QueryBuilder, Result, Sqlite, SqlitePool};
use udulib_common::models::{DocumentHistory, HistoryAction};

use crate::pagination::Pagination;

const COLUMNS: &str = "history_id, document_id, user_id, action, created_at";

#[derive(Debug, Default)]
pub struct HistoryFilter {
    pub user_id: Option<i64>,
    pub document_id: Option<i64>,
    pub action: Option<HistoryAction>,
}

pub async fn get(pool: &SqlitePool, history_id: i64) -> Result<Option<DocumentHistory>> {
    sqlx::query_as(&format!("SELECT {} FROM document_history WHERE history_id = ?", COLUMNS))
        .bind(history_id)
        .fetch_optional(pool)
        .await
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &HistoryFilter) {
    qb.push(" FROM document_history WHERE 1=1");
    if let Some(user_id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(document_id) = filter.document_id {
        qb.push(" AND document_id = ").push_bind(document_id);
    }
    if let Some(action) = filter.action {
        qb.push(" AND action = ").push_bind(action);
    }
}

pub async fn list(
    pool: &SqlitePool,
    filter: &HistoryFilter,
    page: Pagination,
) -> Result<(Vec<DocumentHistory>, i64)> {
    let mut count_qb = QueryBuilder::new("SELECT COUNT(*)");
    push_filter(&mut count_qb, filter);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let mut qb = QueryBuilder::new(format!("SELECT {}", COLUMNS));
    push_filter(&mut qb, filter);
    qb.push(" ORDER BY created_at DESC, history_id DESC LIMIT ")
        .push_bind(page.per_page)
        .push(" OFFSET ")
        .push_bind(page.offset);
    Ok((qb.build_query_as().fetch_all(pool).await?, total))
}

/// Append an entry without touching the document counters
pub async fn create(
    pool: &SqlitePool,
    document_id: i64,
    user_id: i64,
    action: HistoryAction,
) -> Result<DocumentHistory> {
    sqlx::query_as(&format!(
        "INSERT INTO document_history (document_id, user_id, action, created_at) VALUES (?, ?, ?, ?) RETURNING {}",
        COLUMNS
    ))
    .bind(document_id)
    .bind(user_id)
    .bind(action)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

pub async fn delete(pool: &SqlitePool, history_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM document_history WHERE history_id = ?")
        .bind(history_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

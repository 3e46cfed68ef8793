//! Notification queries

use chrono::Utc;
use sqlx::{QueryBuilder, Result, Sqlite, SqlitePool};
use udulib_common::models::Notification;

use crate::pagination::Pagination;

const COLUMNS: &str = "notification_id, user_id, title, content, is_read, notification_type, reference_id, created_at";

/// Notification type strings used by the handlers that create them
pub mod kind {
    pub const DOCUMENT_STATUS: &str = "document_status";
    pub const COMMENT: &str = "comment";
    pub const FORUM_REPLY: &str = "forum_reply";
}

pub struct NewNotification<'a> {
    pub user_id: i64,
    pub title: &'a str,
    pub content: &'a str,
    pub notification_type: &'a str,
    pub reference_id: Option<i64>,
}

pub async fn get(pool: &SqlitePool, notification_id: i64) -> Result<Option<Notification>> {
    sqlx::query_as(&format!(
        "SELECT {} FROM notifications WHERE notification_id = ?",
        COLUMNS
    ))
    .bind(notification_id)
    .fetch_optional(pool)
    .await
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, user_id: Option<i64>, is_read: Option<bool>) {
    qb.push(" FROM notifications WHERE 1=1");
    if let Some(user_id) = user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(is_read) = is_read {
        qb.push(" AND is_read = ").push_bind(is_read);
    }
}

/// Newest first; `user_id = None` lists everyone's
pub async fn list(
    pool: &SqlitePool,
    user_id: Option<i64>,
    is_read: Option<bool>,
    page: Pagination,
) -> Result<(Vec<Notification>, i64)> {
    let mut count_qb = QueryBuilder::new("SELECT COUNT(*)");
    push_filter(&mut count_qb, user_id, is_read);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let mut qb = QueryBuilder::new(format!("SELECT {}", COLUMNS));
    push_filter(&mut qb, user_id, is_read);
    qb.push(" ORDER BY created_at DESC, notification_id DESC LIMIT ")
        .push_bind(page.per_page)
        .push(" OFFSET ")
        .push_bind(page.offset);
    Ok((qb.build_query_as().fetch_all(pool).await?, total))
}

pub async fn unread_count(pool: &SqlitePool, user_id: i64) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

pub async fn create(pool: &SqlitePool, new: NewNotification<'_>) -> Result<Notification> {
    sqlx::query_as(&format!(
        "INSERT INTO notifications (user_id, title, content, is_read, notification_type, reference_id, created_at)
         VALUES (?, ?, ?, 0, ?, ?, ?) RETURNING {}",
        COLUMNS
    ))
    .bind(new.user_id)
    .bind(new.title)
    .bind(new.content)
    .bind(new.notification_type)
    .bind(new.reference_id)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

/// Insert one notification per recipient in a single transaction
pub async fn broadcast(
    pool: &SqlitePool,
    user_ids: &[i64],
    title: &str,
    content: &str,
    notification_type: &str,
) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();
    let mut sent = 0;
    for user_id in user_ids {
        sqlx::query(
            "INSERT INTO notifications (user_id, title, content, is_read, notification_type, created_at)
             VALUES (?, ?, ?, 0, ?, ?)",
        )
        .bind(user_id)
        .bind(title)
        .bind(content)
        .bind(notification_type)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        sent += 1;
    }
    tx.commit().await?;
    Ok(sent)
}

pub async fn set_read(pool: &SqlitePool, notification_id: i64, is_read: bool) -> Result<Notification> {
    sqlx::query_as(&format!(
        "UPDATE notifications SET is_read = ? WHERE notification_id = ? RETURNING {}",
        COLUMNS
    ))
    .bind(is_read)
    .bind(notification_id)
    .fetch_one(pool)
    .await
}

pub async fn mark_all_read(pool: &SqlitePool, user_id: i64) -> Result<u64> {
    let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete(pool: &SqlitePool, notification_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM notifications WHERE notification_id = ?")
        .bind(notification_id)
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
    async fn test_unread_tracking() {
        let pool = connect_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO users (username, email, password_hash, full_name, created_at, updated_at)
                VALUES ('a', 'a@x', 'h', 'A', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');
             INSERT INTO users (username, email, password_hash, full_name, created_at, updated_at)
                VALUES ('b', 'b@x', 'h', 'B', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');",
        )
        .execute(&pool)
        .await
        .unwrap();

        assert_eq!(broadcast(&pool, &[1, 2], "Maintenance", "Tonight", "system").await.unwrap(), 2);
        let n = create(
            &pool,
            NewNotification {
                user_id: 1,
                title: "Reply",
                content: "Someone replied",
                notification_type: kind::FORUM_REPLY,
                reference_id: Some(7),
            },
        )
        .await
        .unwrap();
        assert_eq!(unread_count(&pool, 1).await.unwrap(), 2);

        set_read(&pool, n.notification_id, true).await.unwrap();
        assert_eq!(unread_count(&pool, 1).await.unwrap(), 1);
        assert_eq!(mark_all_read(&pool, 1).await.unwrap(), 1);
        assert_eq!(unread_count(&pool, 1).await.unwrap(), 0);
        assert_eq!(unread_count(&pool, 2).await.unwrap(), 1);

        let page = PageParams::default().validate().unwrap();
        assert_eq!(list(&pool, Some(2), Some(false), page).await.unwrap().1, 1);
        assert_eq!(list(&pool, None, None, page).await.unwrap().1, 3);
    }
}

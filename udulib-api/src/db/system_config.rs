//! Key/value runtime settings editable by administrators

use chrono::Utc;
use sqlx::{Result, SqlitePool};
use udulib_common::models::SystemConfigEntry;

const COLUMNS: &str = "config_id, config_key, config_value, description, updated_at";

pub async fn list(pool: &SqlitePool) -> Result<Vec<SystemConfigEntry>> {
    sqlx::query_as(&format!("SELECT {} FROM system_config ORDER BY config_key", COLUMNS))
        .fetch_all(pool)
        .await
}

pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<SystemConfigEntry>> {
    sqlx::query_as(&format!("SELECT {} FROM system_config WHERE config_key = ?", COLUMNS))
        .bind(key)
        .fetch_optional(pool)
        .await
}

/// Insert or replace; an absent description keeps the stored one
pub async fn upsert(pool: &SqlitePool, key: &str, value: &str, description: Option<&str>) -> Result<SystemConfigEntry> {
    sqlx::query_as(&format!(
        "INSERT INTO system_config (config_key, config_value, description, updated_at) VALUES (?, ?, ?, ?)
         ON CONFLICT (config_key) DO UPDATE SET
             config_value = excluded.config_value,
             description = COALESCE(excluded.description, system_config.description),
             updated_at = excluded.updated_at
         RETURNING {}",
        COLUMNS
    ))
    .bind(key)
    .bind(value)
    .bind(description)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

pub async fn delete(pool: &SqlitePool, key: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM system_config WHERE config_key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use udulib_common::db::connect_in_memory;

    #[tokio::test]
    async fn test_upsert_preserves_description() {
        let pool = connect_in_memory().await.unwrap();
        upsert(&pool, "max_upload_mb", "50", Some("Upload limit")).await.unwrap();
        let entry = upsert(&pool, "max_upload_mb", "100", None).await.unwrap();
        assert_eq!(entry.config_value, "100");
        assert_eq!(entry.description.as_deref(), Some("Upload limit"));
        assert_eq!(list(&pool).await.unwrap().len(), 1);

        assert!(delete(&pool, "max_upload_mb").await.unwrap());
        assert!(get(&pool, "max_upload_mb").await.unwrap().is_none());
    }
}

//! Database initialization
//!
//! Opens (creating if needed) the SQLite database, creates every table
//! idempotently and bootstraps the first administrator account.

use crate::config::{AdminConfig, DatabaseConfig};
use crate::models::{UserRole, UserStatus};
use crate::security::hash_password;
use crate::{Error, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Open the configured database and create tables if needed
pub async fn init_database(config: &DatabaseConfig) -> Result<SqlitePool> {
    if config.path.as_os_str() == ":memory:" {
        return connect_in_memory().await;
    }

    let newly_created = !config.path.exists();
    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::new()
        .filename(&config.path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", config.path.display());
    } else {
        info!("Opened existing database: {}", config.path.display());
    }

    create_schema(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// The connection is never recycled, since closing it would drop the data.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables (safe to call repeatedly)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_users_table(pool).await?;
    create_majors_table(pool).await?;
    create_academic_years_table(pool).await?;
    create_departments_table(pool).await?;
    create_subjects_table(pool).await?;
    create_subject_departments_table(pool).await?;
    create_documents_table(pool).await?;
    create_tags_table(pool).await?;
    create_document_tags_table(pool).await?;
    create_document_likes_table(pool).await?;
    create_comments_table(pool).await?;
    create_ratings_table(pool).await?;
    create_document_history_table(pool).await?;
    create_shared_links_table(pool).await?;
    create_forums_table(pool).await?;
    create_forum_posts_table(pool).await?;
    create_forum_post_likes_table(pool).await?;
    create_forum_replies_table(pool).await?;
    create_notifications_table(pool).await?;
    create_system_config_table(pool).await?;
    Ok(())
}

async fn execute_all(pool: &SqlitePool, statements: &[&str]) -> Result<()> {
    for sql in statements {
        sqlx::query(sql).execute(pool).await?;
    }
    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                full_name TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'student' CHECK (role IN ('student', 'lecturer', 'admin')),
                status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'banned', 'pending')),
                university_id TEXT,
                phone_number TEXT,
                avatar_url TEXT,
                google_id TEXT UNIQUE,
                is_private INTEGER NOT NULL DEFAULT 0,
                last_login TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_users_role ON users(role)",
        ],
    )
    .await
}

async fn create_majors_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[r#"
            CREATE TABLE IF NOT EXISTS majors (
                major_id INTEGER PRIMARY KEY AUTOINCREMENT,
                major_name TEXT NOT NULL,
                major_code TEXT NOT NULL UNIQUE,
                description TEXT,
                image_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#],
    )
    .await
}

async fn create_academic_years_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[r#"
            CREATE TABLE IF NOT EXISTS academic_years (
                year_id INTEGER PRIMARY KEY AUTOINCREMENT,
                year_name TEXT NOT NULL UNIQUE,
                year_order INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#],
    )
    .await
}

async fn create_departments_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[r#"
            CREATE TABLE IF NOT EXISTS departments (
                department_id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                description TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#],
    )
    .await
}

// Subjects and documents RESTRICT deletion of their parents; handlers
// report those conflicts as 400 before attempting the delete.
async fn create_subjects_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS subjects (
                subject_id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_name TEXT NOT NULL,
                subject_code TEXT NOT NULL,
                description TEXT,
                major_id INTEGER NOT NULL REFERENCES majors(major_id) ON DELETE RESTRICT,
                year_id INTEGER NOT NULL REFERENCES academic_years(year_id) ON DELETE RESTRICT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (major_id, subject_code)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_subjects_year ON subjects(year_id)",
        ],
    )
    .await
}

async fn create_subject_departments_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[r#"
            CREATE TABLE IF NOT EXISTS subject_departments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id INTEGER NOT NULL REFERENCES subjects(subject_id) ON DELETE CASCADE,
                department_id INTEGER NOT NULL REFERENCES departments(department_id) ON DELETE CASCADE,
                UNIQUE (subject_id, department_id)
            )
            "#],
    )
    .await
}

async fn create_documents_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                document_id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT,
                file_path TEXT NOT NULL,
                file_size INTEGER NOT NULL DEFAULT 0,
                file_type TEXT NOT NULL DEFAULT 'OTHER',
                subject_id INTEGER NOT NULL REFERENCES subjects(subject_id) ON DELETE RESTRICT,
                user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('approved', 'pending', 'rejected')),
                view_count INTEGER NOT NULL DEFAULT 0,
                download_count INTEGER NOT NULL DEFAULT 0,
                like_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_documents_subject ON documents(subject_id)",
            "CREATE INDEX IF NOT EXISTS idx_documents_user ON documents(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status)",
        ],
    )
    .await
}

async fn create_tags_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[r#"
            CREATE TABLE IF NOT EXISTS tags (
                tag_id INTEGER PRIMARY KEY AUTOINCREMENT,
                tag_name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )
            "#],
    )
    .await
}

async fn create_document_tags_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS document_tags (
                document_tag_id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL REFERENCES documents(document_id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(tag_id) ON DELETE CASCADE,
                UNIQUE (document_id, tag_id)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_document_tags_tag ON document_tags(tag_id)",
        ],
    )
    .await
}

async fn create_document_likes_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[r#"
            CREATE TABLE IF NOT EXISTS document_likes (
                like_id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL REFERENCES documents(document_id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                UNIQUE (document_id, user_id)
            )
            "#],
    )
    .await
}

async fn create_comments_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                comment_id INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                document_id INTEGER NOT NULL REFERENCES documents(document_id) ON DELETE CASCADE,
                parent_comment_id INTEGER REFERENCES comments(comment_id) ON DELETE CASCADE,
                status TEXT NOT NULL DEFAULT 'approved' CHECK (status IN ('approved', 'pending', 'rejected')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_comments_document ON comments(document_id)",
        ],
    )
    .await
}

async fn create_ratings_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[r#"
            CREATE TABLE IF NOT EXISTS ratings (
                rating_id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL REFERENCES documents(document_id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                score INTEGER NOT NULL CHECK (score BETWEEN 0 AND 5),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (user_id, document_id)
            )
            "#],
    )
    .await
}

async fn create_document_history_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS document_history (
                history_id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL REFERENCES documents(document_id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                action TEXT NOT NULL CHECK (action IN ('view', 'download')),
                created_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_history_user ON document_history(user_id)",
        ],
    )
    .await
}

async fn create_shared_links_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[r#"
            CREATE TABLE IF NOT EXISTS shared_links (
                link_id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL REFERENCES documents(document_id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                share_token TEXT NOT NULL UNIQUE,
                expiration_date TEXT,
                created_at TEXT NOT NULL
            )
            "#],
    )
    .await
}

async fn create_forums_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[r#"
            CREATE TABLE IF NOT EXISTS forums (
                forum_id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id INTEGER NOT NULL UNIQUE REFERENCES subjects(subject_id) ON DELETE CASCADE,
                description TEXT,
                created_at TEXT NOT NULL
            )
            "#],
    )
    .await
}

async fn create_forum_posts_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS forum_posts (
                post_id INTEGER PRIMARY KEY AUTOINCREMENT,
                forum_id INTEGER NOT NULL REFERENCES forums(forum_id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'approved' CHECK (status IN ('approved', 'pending', 'rejected')),
                views INTEGER NOT NULL DEFAULT 0,
                like_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_forum_posts_forum ON forum_posts(forum_id)",
        ],
    )
    .await
}

async fn create_forum_post_likes_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[r#"
            CREATE TABLE IF NOT EXISTS forum_post_likes (
                like_id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL REFERENCES forum_posts(post_id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                UNIQUE (post_id, user_id)
            )
            "#],
    )
    .await
}

async fn create_forum_replies_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS forum_replies (
                reply_id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL REFERENCES forum_posts(post_id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                parent_reply_id INTEGER REFERENCES forum_replies(reply_id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'approved' CHECK (status IN ('approved', 'pending', 'rejected')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_forum_replies_post ON forum_replies(post_id)",
        ],
    )
    .await
}

async fn create_notifications_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                notification_id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                notification_type TEXT NOT NULL,
                reference_id INTEGER,
                created_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, is_read)",
        ],
    )
    .await
}

async fn create_system_config_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[r#"
            CREATE TABLE IF NOT EXISTS system_config (
                config_id INTEGER PRIMARY KEY AUTOINCREMENT,
                config_key TEXT NOT NULL UNIQUE,
                config_value TEXT NOT NULL,
                description TEXT,
                updated_at TEXT NOT NULL
            )
            "#],
    )
    .await
}

/// Create the configured administrator when no account uses its email
///
/// Returns the new user id, or `None` when nothing was created.
pub async fn ensure_admin_user(pool: &SqlitePool, admin: &AdminConfig, bcrypt_cost: u32) -> Result<Option<i64>> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT user_id FROM users WHERE email = ?")
        .bind(&admin.email)
        .fetch_optional(pool)
        .await?;
    if exists.is_some() {
        return Ok(None);
    }

    let Some(password) = admin.password.clone() else {
        let admins: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
            .fetch_one(pool)
            .await?;
        if admins == 0 {
            warn!("No administrator account exists and admin.password is not configured");
        }
        return Ok(None);
    };

    let hash = tokio::task::spawn_blocking(move || hash_password(&password, bcrypt_cost))
        .await
        .map_err(|e| Error::Internal(format!("Password hashing task failed: {}", e)))??;

    let now = Utc::now();
    let user_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO users (username, email, password_hash, full_name, role, status, is_private, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)
        RETURNING user_id
        "#,
    )
    .bind(&admin.username)
    .bind(&admin.email)
    .bind(hash)
    .bind(&admin.full_name)
    .bind(UserRole::Admin)
    .bind(UserStatus::Active)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    info!("Created administrator account {} (user_id={})", admin.email, user_id);
    Ok(Some(user_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = connect_in_memory().await.unwrap();
        create_schema(&pool).await.unwrap();

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 20);
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let pool = connect_in_memory().await.unwrap();
        let result = sqlx::query(
            "INSERT INTO subjects (subject_name, subject_code, major_id, year_id, created_at, updated_at)
             VALUES ('Orphan', 'X1', 999, 999, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_admin_bootstrap_runs_once() {
        let pool = connect_in_memory().await.unwrap();
        let admin = AdminConfig {
            password: Some("admin-password".to_string()),
            ..AdminConfig::default()
        };

        let first = ensure_admin_user(&pool, &admin, 4).await.unwrap();
        assert!(first.is_some());
        let second = ensure_admin_user(&pool, &admin, 4).await.unwrap();
        assert!(second.is_none());

        let role: String = sqlx::query_scalar("SELECT role FROM users WHERE email = ?")
            .bind(&admin.email)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(role, "admin");
    }

    #[tokio::test]
    async fn test_admin_bootstrap_skipped_without_password() {
        let pool = connect_in_memory().await.unwrap();
        let created = ensure_admin_user(&pool, &AdminConfig::default(), 4).await.unwrap();
        assert!(created.is_none());
    }
}

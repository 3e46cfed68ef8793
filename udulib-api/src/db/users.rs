//! User account queries

use chrono::Utc;
use sqlx::{QueryBuilder, Result, Sqlite, SqlitePool};
use udulib_common::models::{User, UserRole, UserStatus};

use crate::pagination::Pagination;

const COLUMNS: &str = "user_id, username, email, password_hash, full_name, role, status, university_id, \
                       phone_number, avatar_url, google_id, is_private, last_login, created_at, updated_at";

pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub university_id: Option<String>,
    pub phone_number: Option<String>,
    pub google_id: Option<String>,
    pub avatar_url: Option<String>,
}

/// Columns to change; `None` leaves a column as is
#[derive(Debug, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub university_id: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
}

#[derive(Debug, Default)]
pub struct UserFilter {
    pub search: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
}

pub async fn get_by_id(pool: &SqlitePool, user_id: i64) -> Result<Option<User>> {
    sqlx::query_as(&format!("SELECT {} FROM users WHERE user_id = ?", COLUMNS))
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn get_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    sqlx::query_as(&format!("SELECT {} FROM users WHERE email = ? COLLATE NOCASE", COLUMNS))
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn get_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    sqlx::query_as(&format!("SELECT {} FROM users WHERE username = ?", COLUMNS))
        .bind(username)
        .fetch_optional(pool)
        .await
}

pub async fn get_by_google_id(pool: &SqlitePool, google_id: &str) -> Result<Option<User>> {
    sqlx::query_as(&format!("SELECT {} FROM users WHERE google_id = ?", COLUMNS))
        .bind(google_id)
        .fetch_optional(pool)
        .await
}

pub async fn create(pool: &SqlitePool, user: NewUser) -> Result<User> {
    let now = Utc::now();
    sqlx::query_as(&format!(
        r#"
        INSERT INTO users (username, email, password_hash, full_name, role, status, university_id,
                           phone_number, google_id, avatar_url, is_private, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(user.username)
    .bind(user.email)
    .bind(user.password_hash)
    .bind(user.full_name)
    .bind(user.role)
    .bind(user.status)
    .bind(user.university_id)
    .bind(user.phone_number)
    .bind(user.google_id)
    .bind(user.avatar_url)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
}

/// Apply `changes` and return the updated row (`RowNotFound` when missing)
pub async fn update(pool: &SqlitePool, user_id: i64, changes: UserChanges) -> Result<User> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE users SET updated_at = ");
    qb.push_bind(Utc::now());
    if let Some(email) = changes.email {
        qb.push(", email = ").push_bind(email);
    }
    if let Some(username) = changes.username {
        qb.push(", username = ").push_bind(username);
    }
    if let Some(full_name) = changes.full_name {
        qb.push(", full_name = ").push_bind(full_name);
    }
    if let Some(phone) = changes.phone_number {
        qb.push(", phone_number = ").push_bind(phone);
    }
    if let Some(university_id) = changes.university_id {
        qb.push(", university_id = ").push_bind(university_id);
    }
    if let Some(hash) = changes.password_hash {
        qb.push(", password_hash = ").push_bind(hash);
    }
    if let Some(role) = changes.role {
        qb.push(", role = ").push_bind(role);
    }
    if let Some(status) = changes.status {
        qb.push(", status = ").push_bind(status);
    }
    qb.push(" WHERE user_id = ").push_bind(user_id);
    qb.push(" RETURNING ").push(COLUMNS);
    qb.build_query_as().fetch_one(pool).await
}

pub async fn set_last_login(pool: &SqlitePool, user_id: i64) -> Result<()> {
    sqlx::query("UPDATE users SET last_login = ? WHERE user_id = ?")
        .bind(Utc::now())
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_password_hash(pool: &SqlitePool, user_id: i64, hash: &str) -> Result<()> {
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE user_id = ?")
        .bind(hash)
        .bind(Utc::now())
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_avatar(pool: &SqlitePool, user_id: i64, avatar_url: Option<&str>) -> Result<User> {
    sqlx::query_as(&format!(
        "UPDATE users SET avatar_url = ?, updated_at = ? WHERE user_id = ? RETURNING {}",
        COLUMNS
    ))
    .bind(avatar_url)
    .bind(Utc::now())
    .bind(user_id)
    .fetch_one(pool)
    .await
}

pub async fn set_privacy(pool: &SqlitePool, user_id: i64, is_private: bool) -> Result<User> {
    sqlx::query_as(&format!(
        "UPDATE users SET is_private = ?, updated_at = ? WHERE user_id = ? RETURNING {}",
        COLUMNS
    ))
    .bind(is_private)
    .bind(Utc::now())
    .bind(user_id)
    .fetch_one(pool)
    .await
}

pub async fn link_google_id(pool: &SqlitePool, user_id: i64, google_id: &str) -> Result<()> {
    sqlx::query("UPDATE users SET google_id = ?, updated_at = ? WHERE user_id = ?")
        .bind(google_id)
        .bind(Utc::now())
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

fn push_filter<'a>(qb: &mut QueryBuilder<'a, Sqlite>, filter: &'a UserFilter) {
    qb.push(" WHERE 1=1");
    super::push_search(qb, &["username", "email", "full_name"], filter.search.as_deref());
    if let Some(role) = filter.role {
        qb.push(" AND role = ").push_bind(role);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
}

pub async fn count(pool: &SqlitePool, filter: &UserFilter) -> Result<i64> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM users");
    push_filter(&mut qb, filter);
    qb.build_query_scalar().fetch_one(pool).await
}

pub async fn list(pool: &SqlitePool, filter: &UserFilter, page: Pagination) -> Result<(Vec<User>, i64)> {
    let total = count(pool, filter).await?;

    let mut qb = QueryBuilder::new(format!("SELECT {} FROM users", COLUMNS));
    push_filter(&mut qb, filter);
    qb.push(" ORDER BY created_at DESC, user_id DESC LIMIT ")
        .push_bind(page.per_page)
        .push(" OFFSET ")
        .push_bind(page.offset);
    let users = qb.build_query_as().fetch_all(pool).await?;
    Ok((users, total))
}

/// Active administrators, used to protect the last one
pub async fn count_active_admins(pool: &SqlitePool) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin' AND status = 'active'")
        .fetch_one(pool)
        .await
}

/// Ban the given accounts, returning how many changed
pub async fn bulk_deactivate(pool: &SqlitePool, user_ids: &[i64]) -> Result<u64> {
    if user_ids.is_empty() {
        return Ok(0);
    }
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE users SET status = 'banned', updated_at = ");
    qb.push_bind(Utc::now());
    qb.push(" WHERE status != 'banned' AND user_id IN (");
    let mut ids = qb.separated(", ");
    for id in user_ids {
        ids.push_bind(*id);
    }
    qb.push(")");
    Ok(qb.build().execute(pool).await?.rows_affected())
}

pub async fn delete(pool: &SqlitePool, user_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM users WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Every stored blob a user owns, collected before the row cascades away
pub async fn owned_file_paths(pool: &SqlitePool, user_id: i64) -> Result<Vec<String>> {
    sqlx::query_scalar(
        "SELECT file_path FROM documents WHERE user_id = ?
         UNION ALL
         SELECT avatar_url FROM users WHERE user_id = ? AND avatar_url IS NOT NULL",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Ids of users with the given role, or every user
pub async fn ids_by_role(pool: &SqlitePool, role: Option<UserRole>) -> Result<Vec<i64>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT user_id FROM users WHERE status = 'active'");
    if let Some(role) = role {
        qb.push(" AND role = ").push_bind(role);
    }
    qb.build_query_scalar().fetch_all(pool).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::PageParams;
    use udulib_common::db::connect_in_memory;

    fn new_user(name: &str, role: UserRole) -> NewUser {
        NewUser {
            username: name.to_string(),
            email: format!("{}@udu.edu", name),
            password_hash: "x".to_string(),
            full_name: format!("{} Nguyen", name),
            role,
            status: UserStatus::Active,
            university_id: None,
            phone_number: None,
            google_id: None,
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let pool = connect_in_memory().await.unwrap();
        let user = create(&pool, new_user("an", UserRole::Student)).await.unwrap();
        assert_eq!(user.role, UserRole::Student);
        assert!(!user.is_private);

        let by_email = get_by_email(&pool, "AN@udu.edu").await.unwrap().unwrap();
        assert_eq!(by_email.user_id, user.user_id);
        assert!(get_by_username(&pool, "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_partial() {
        let pool = connect_in_memory().await.unwrap();
        let user = create(&pool, new_user("binh", UserRole::Student)).await.unwrap();
        let updated = update(
            &pool,
            user.user_id,
            UserChanges {
                full_name: Some("Binh Tran".into()),
                role: Some(UserRole::Lecturer),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.full_name, "Binh Tran");
        assert_eq!(updated.role, UserRole::Lecturer);
        assert_eq!(updated.email, "binh@udu.edu");

        let missing = update(&pool, 999, UserChanges::default()).await;
        assert!(matches!(missing, Err(sqlx::Error::RowNotFound)));
    }

    #[tokio::test]
    async fn test_list_filters_and_bulk_deactivate() {
        let pool = connect_in_memory().await.unwrap();
        let a = create(&pool, new_user("chi", UserRole::Student)).await.unwrap();
        let b = create(&pool, new_user("dung", UserRole::Lecturer)).await.unwrap();
        create(&pool, new_user("admin1", UserRole::Admin)).await.unwrap();

        let page = PageParams::default().validate().unwrap();
        let filter = UserFilter {
            role: Some(UserRole::Lecturer),
            ..Default::default()
        };
        let (users, total) = list(&pool, &filter, page).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(users[0].username, "dung");

        let filter = UserFilter {
            search: Some("CHI".into()),
            ..Default::default()
        };
        assert_eq!(count(&pool, &filter).await.unwrap(), 1);

        assert_eq!(bulk_deactivate(&pool, &[a.user_id, b.user_id, 999]).await.unwrap(), 2);
        assert_eq!(bulk_deactivate(&pool, &[a.user_id]).await.unwrap(), 0);
        assert_eq!(count_active_admins(&pool).await.unwrap(), 1);
    }
}

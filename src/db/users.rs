use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::info;

use crate::password::hash_password;

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) password_hash: String,
    pub(crate) is_admin: bool,
    pub(crate) converted_count: i64,
    pub(crate) created_at: i64,
}

/// Public projection of a user, never carrying the password hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserView {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) is_admin: bool,
    pub(crate) converted_count: i64,
}

impl From<&User> for UserView {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.clone(),
            name: u.name.clone(),
            email: u.email.clone(),
            is_admin: u.is_admin,
            converted_count: u.converted_count,
        }
    }
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Inserts a user. Returns `None` when the email is already registered.
pub(crate) async fn create(
    pool: &SqlitePool,
    name: &str,
    email: &str,
    password_hash: &str,
    is_admin: bool,
) -> Result<Option<User>, sqlx::Error> {
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.trim().to_string(),
        email: normalize_email(email),
        password_hash: password_hash.to_string(),
        is_admin,
        converted_count: 0,
        created_at: OffsetDateTime::now_utc().unix_timestamp(),
    };

    let result = sqlx::query(
        r#"
        INSERT INTO users (id, name, email, password_hash, is_admin, converted_count, created_at)
        VALUES (?, ?, ?, ?, ?, 0, ?)
        ON CONFLICT(email) DO NOTHING
        "#,
    )
    .bind(&user.id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.is_admin)
    .bind(user.created_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    Ok(Some(user))
}

pub(crate) async fn find_by_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn increment_converted(pool: &SqlitePool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET converted_count = converted_count + 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Makes sure an admin account exists for `email`, promoting an existing
/// account if needed. The password of an existing account is left as is.
pub(crate) async fn ensure_admin(
    pool: &SqlitePool,
    email: &str,
    password: &str,
    name: &str,
) -> Result<(), sqlx::Error> {
    if let Some(existing) = find_by_email(pool, email).await? {
        if !existing.is_admin {
            sqlx::query("UPDATE users SET is_admin = 1 WHERE id = ?")
                .bind(&existing.id)
                .execute(pool)
                .await?;
            info!(email = %existing.email, "promoted existing account to admin");
        }
        return Ok(());
    }

    create(pool, name, email, &hash_password(password), true).await?;
    info!(email = %normalize_email(email), "seeded admin account");
    Ok(())
}

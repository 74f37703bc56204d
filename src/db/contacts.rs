use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::SqlitePool;

use crate::util::rfc3339;

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct Contact {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) subject: String,
    pub(crate) message: String,
    pub(crate) status: String,
    pub(crate) ip_address: Option<String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) reply_message: Option<String>,
    pub(crate) replied_at: Option<i64>,
    pub(crate) replied_by: Option<String>,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AdminReply {
    pub(crate) message: String,
    pub(crate) replied_at: String,
    pub(crate) replied_by: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContactView {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) subject: String,
    pub(crate) message: String,
    pub(crate) status: String,
    pub(crate) ip_address: Option<String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) admin_reply: Option<AdminReply>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl Contact {
    pub(crate) fn admin_reply(&self) -> Option<AdminReply> {
        let message = self.reply_message.clone()?;
        Some(AdminReply {
            message,
            replied_at: self.replied_at.map(rfc3339).unwrap_or_default(),
            replied_by: self.replied_by.clone().unwrap_or_else(|| "Admin".to_string()),
        })
    }
}

impl From<Contact> for ContactView {
    fn from(c: Contact) -> Self {
        let admin_reply = c.admin_reply();
        Self {
            id: c.id,
            name: c.name,
            email: c.email,
            subject: c.subject,
            message: c.message,
            status: c.status,
            ip_address: c.ip_address,
            user_agent: c.user_agent,
            admin_reply,
            created_at: rfc3339(c.created_at),
            updated_at: rfc3339(c.updated_at),
        }
    }
}

pub(crate) struct NewContact<'a> {
    pub(crate) name: &'a str,
    pub(crate) email: &'a str,
    pub(crate) subject: &'a str,
    pub(crate) message: &'a str,
    pub(crate) ip_address: Option<String>,
    pub(crate) user_agent: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContactStats {
    pub(crate) total: i64,
    pub(crate) today: i64,
    pub(crate) by_status: BTreeMap<String, i64>,
}

pub(crate) async fn insert(
    pool: &SqlitePool,
    new: NewContact<'_>,
    now: i64,
) -> Result<Contact, sqlx::Error> {
    let contact = Contact {
        id: uuid::Uuid::new_v4().to_string(),
        name: new.name.trim().to_string(),
        email: new.email.trim().to_string(),
        subject: new.subject.trim().to_string(),
        message: new.message.to_string(),
        status: "new".to_string(),
        ip_address: new.ip_address,
        user_agent: new.user_agent,
        reply_message: None,
        replied_at: None,
        replied_by: None,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO contacts
            (id, name, email, subject, message, status, ip_address, user_agent, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&contact.id)
    .bind(&contact.name)
    .bind(&contact.email)
    .bind(&contact.subject)
    .bind(&contact.message)
    .bind(&contact.status)
    .bind(&contact.ip_address)
    .bind(&contact.user_agent)
    .bind(contact.created_at)
    .bind(contact.updated_at)
    .execute(pool)
    .await?;

    Ok(contact)
}

/// Newest first. `page` is 1-based.
pub(crate) async fn list(
    pool: &SqlitePool,
    status: Option<&str>,
    page: i64,
    limit: i64,
) -> Result<Vec<Contact>, sqlx::Error> {
    let offset = (page - 1).max(0) * limit;
    match status {
        Some(status) => {
            sqlx::query_as::<_, Contact>(
                "SELECT * FROM contacts WHERE status = ? ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            )
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, Contact>(
                "SELECT * FROM contacts ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
        }
    }
}

pub(crate) async fn count(pool: &SqlitePool, status: Option<&str>) -> Result<i64, sqlx::Error> {
    match status {
        Some(status) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM contacts WHERE status = ?")
                .bind(status)
                .fetch_one(pool)
                .await
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(*) FROM contacts")
                .fetch_one(pool)
                .await
        }
    }
}

pub(crate) async fn get(pool: &SqlitePool, id: &str) -> Result<Option<Contact>, sqlx::Error> {
    sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn latest_for_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<Contact>, sqlx::Error> {
    sqlx::query_as::<_, Contact>(
        "SELECT * FROM contacts WHERE email = ? ORDER BY created_at DESC, rowid DESC LIMIT 1",
    )
    .bind(email.trim())
    .fetch_optional(pool)
    .await
}

pub(crate) async fn set_status(
    pool: &SqlitePool,
    id: &str,
    status: &str,
    now: i64,
) -> Result<Option<Contact>, sqlx::Error> {
    let result = sqlx::query("UPDATE contacts SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get(pool, id).await
}

pub(crate) async fn reply(
    pool: &SqlitePool,
    id: &str,
    message: &str,
    replied_by: &str,
    now: i64,
) -> Result<Option<Contact>, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE contacts
        SET reply_message = ?, replied_at = ?, replied_by = ?, status = 'replied', updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(message)
    .bind(now)
    .bind(replied_by)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get(pool, id).await
}

/// Returns whether a row was deleted.
pub(crate) async fn delete(pool: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM contacts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn stats(pool: &SqlitePool, today_start: i64) -> Result<ContactStats, sqlx::Error> {
    let total = count(pool, None).await?;
    let today: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contacts WHERE created_at >= ?")
        .bind(today_start)
        .fetch_one(pool)
        .await?;
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM contacts GROUP BY status")
            .fetch_all(pool)
            .await?;

    Ok(ContactStats {
        total,
        today,
        by_status: rows.into_iter().collect(),
    })
}

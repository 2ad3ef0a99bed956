//! Login sessions: opaque session ids mapped to accounts.

use chrono::{DateTime, Utc};
use circles_common::models::circle::AccountId;
use sqlx::SqlitePool;

/// A stored login.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Login {
    pub account_id: AccountId,
    pub created: DateTime<Utc>,
}

impl Login {
    /// Whether the login is older than `ttl_secs`.
    pub fn is_expired(&self, ttl_secs: u64, now: DateTime<Utc>) -> bool {
        match i64::try_from(ttl_secs).ok().and_then(chrono::Duration::try_seconds) {
            Some(ttl) => now.signed_duration_since(self.created) > ttl,
            None => false,
        }
    }
}

/// Record a login for `session_id`, replacing whatever account it pointed at before.
pub async fn create_login(
    pool: &SqlitePool,
    session_id: &str,
    account_id: AccountId,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO logins (session_id, account_id, created)
        VALUES (?, ?, ?)
        ON CONFLICT (session_id) DO UPDATE SET
            account_id = excluded.account_id,
            created = excluded.created
        "#,
    )
    .bind(session_id)
    .bind(account_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// The login stored under `session_id`, if any.
pub async fn find_login(pool: &SqlitePool, session_id: &str) -> Result<Option<Login>, sqlx::Error> {
    sqlx::query_as::<_, Login>("SELECT account_id, created FROM logins WHERE session_id = ?")
        .bind(session_id)
        .fetch_optional(pool)
        .await
}

/// Forget a login. Returns whether a row was removed.
pub async fn delete_login(pool: &SqlitePool, session_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM logins WHERE session_id = ?")
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

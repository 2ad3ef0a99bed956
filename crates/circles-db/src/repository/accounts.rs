//! Account repository: CRUD operations for accounts.

use chrono::Utc;
use circles_common::models::{
    account::{Account, DEFAULT_PFP},
    circle::AccountId,
};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

/// Profile fields to change. `None` leaves a field alone; `display_name: Some(None)` clears it.
#[derive(Debug, Default)]
pub struct AccountChanges<'a> {
    pub username: Option<&'a str>,
    pub display_name: Option<Option<&'a str>>,
    pub bio: Option<&'a str>,
}

impl AccountChanges<'_> {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.display_name.is_none() && self.bio.is_none()
    }
}

/// Create a new account.
pub async fn create_account(
    pool: &SqlitePool,
    username: &str,
    password_hash: &str,
) -> Result<Account, sqlx::Error> {
    sqlx::query_as::<_, Account>(
        r#"
        INSERT INTO accounts (username, display_name, pfp, bio, password_hash, created)
        VALUES (?, NULL, ?, '', ?, ?)
        RETURNING *
        "#,
    )
    .bind(username)
    .bind(DEFAULT_PFP)
    .bind(password_hash)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

/// Find an account by its ID.
pub async fn find_by_id(pool: &SqlitePool, id: AccountId) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Find an account by username (case-insensitive).
pub async fn find_by_username(pool: &SqlitePool, username: &str) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE username = ? COLLATE NOCASE")
        .bind(username)
        .fetch_optional(pool)
        .await
}

/// Apply profile changes and return the updated account.
pub async fn update_account(
    pool: &SqlitePool,
    id: AccountId,
    changes: &AccountChanges<'_>,
) -> Result<Option<Account>, sqlx::Error> {
    if changes.is_empty() {
        return find_by_id(pool, id).await;
    }

    let mut update = QueryBuilder::<Sqlite>::new("UPDATE accounts SET ");
    {
        let mut columns = update.separated(", ");
        if let Some(username) = changes.username {
            columns.push("username = ").push_bind_unseparated(username);
        }
        if let Some(display_name) = changes.display_name {
            columns.push("display_name = ").push_bind_unseparated(display_name);
        }
        if let Some(bio) = changes.bio {
            columns.push("bio = ").push_bind_unseparated(bio);
        }
    }
    update.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

    update.build_query_as::<Account>().fetch_optional(pool).await
}

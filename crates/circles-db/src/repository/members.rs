//! Member repository: circle membership and role assignment.

use chrono::Utc;
use circles_common::error::{CirclesError, CirclesResult};
use circles_common::models::{
    circle::{AccountId, CircleId},
    role::RoleId,
};
use sqlx::SqlitePool;

use super::roles;
use crate::sqlite::is_unique_violation;

/// Add an account to a circle and give it the circle's `::everyone` role.
pub async fn add_member(
    pool: &SqlitePool,
    circle_id: CircleId,
    account_id: AccountId,
) -> CirclesResult<i64> {
    let mut tx = pool.begin().await?;

    let everyone = roles::everyone_role(&mut *tx, circle_id)
        .await?
        .ok_or_else(|| CirclesError::not_found("Circle"))?;

    let member_id: i64 = sqlx::query_scalar(
        "INSERT INTO circle_members (circle_id, account_id, created) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(circle_id)
    .bind(account_id)
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            CirclesError::AlreadyExists {
                resource: "Membership".into(),
            }
        } else {
            e.into()
        }
    })?;

    sqlx::query("INSERT INTO role_members (role_id, circle_member_id) VALUES (?, ?)")
        .bind(everyone.id)
        .bind(member_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    tracing::debug!(circle_id, account_id, "Member added");
    Ok(member_id)
}

/// Check if an account is a member of a circle.
pub async fn is_member(
    pool: &SqlitePool,
    circle_id: CircleId,
    account_id: AccountId,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM circle_members WHERE circle_id = ? AND account_id = ?)",
    )
    .bind(circle_id)
    .bind(account_id)
    .fetch_one(pool)
    .await
}

/// Give a member one more role. Assigning a held role is a no-op.
pub async fn assign_role(
    pool: &SqlitePool,
    circle_id: CircleId,
    account_id: AccountId,
    role_id: RoleId,
) -> CirclesResult<()> {
    let member_id: i64 = sqlx::query_scalar(
        "SELECT id FROM circle_members WHERE circle_id = ? AND account_id = ?",
    )
    .bind(circle_id)
    .bind(account_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| CirclesError::not_found("Membership"))?;

    sqlx::query("INSERT OR IGNORE INTO role_members (role_id, circle_member_id) VALUES (?, ?)")
        .bind(role_id)
        .bind(member_id)
        .execute(pool)
        .await?;
    Ok(())
}

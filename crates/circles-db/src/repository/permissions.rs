//! Effective permission resolution.
//!
//! For a circle C with ancestors A1..An, grants are read level by level in the order
//! [C, A1, .., An]. Within a level rows are ordered by role priority (lower first, ties by
//! role id) and the first value seen for a permission number wins. A permission no
//! level mentions stays absent from the result.

use circles_common::models::{circle::CircleId, role::RoleId};
use circles_common::permissions::{PermissionNumber, PermissionSet};
use sqlx::{Executor, QueryBuilder, Sqlite, SqlitePool};

use super::circles;

/// Store one grant row. `circle_id` may be a descendant of the role's circle.
pub async fn insert_grant<'e, E>(
    executor: E,
    role_id: RoleId,
    circle_id: CircleId,
    number: PermissionNumber,
    granted: bool,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO role_permissions (role_id, circle_id, permission_number, granted)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(role_id)
    .bind(circle_id)
    .bind(number)
    .bind(granted)
    .execute(executor)
    .await?;
    Ok(())
}

/// Effective values of `numbers` for the given roles. Empty `roles` or `numbers` resolve to
/// an empty set without touching the database.
pub async fn effective_some(
    pool: &SqlitePool,
    circle_id: CircleId,
    roles: &[RoleId],
    numbers: &[PermissionNumber],
) -> Result<PermissionSet, sqlx::Error> {
    if numbers.is_empty() {
        return Ok(PermissionSet::new());
    }
    effective(pool, circle_id, roles, Some(numbers)).await
}

/// Effective values of every permission any level mentions for the given roles.
pub async fn effective_all(
    pool: &SqlitePool,
    circle_id: CircleId,
    roles: &[RoleId],
) -> Result<PermissionSet, sqlx::Error> {
    effective(pool, circle_id, roles, None).await
}

async fn effective(
    pool: &SqlitePool,
    circle_id: CircleId,
    roles: &[RoleId],
    filter: Option<&[PermissionNumber]>,
) -> Result<PermissionSet, sqlx::Error> {
    let mut resolved = PermissionSet::new();
    if roles.is_empty() {
        return Ok(resolved);
    }

    let mut chain = vec![circle_id];
    chain.extend(circles::ancestors(pool, circle_id).await?);

    for level in chain {
        let mut query = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT rp.permission_number, rp.granted FROM role_permissions rp
            JOIN roles r ON r.id = rp.role_id
            WHERE rp.circle_id = "#,
        );
        query.push_bind(level);

        query.push(" AND rp.role_id IN (");
        let mut ids = query.separated(", ");
        for role_id in roles {
            ids.push_bind(*role_id);
        }
        ids.push_unseparated(")");

        if let Some(numbers) = filter {
            query.push(" AND rp.permission_number IN (");
            let mut wanted = query.separated(", ");
            for number in numbers {
                wanted.push_bind(*number);
            }
            wanted.push_unseparated(")");
        }

        query.push(" ORDER BY r.priority_order ASC, r.id ASC");

        let rows: Vec<(PermissionNumber, bool)> = query.build_query_as().fetch_all(pool).await?;
        for (number, granted) in rows {
            resolved.set_if_unset(number, granted);
        }
    }

    tracing::trace!(circle_id, resolved = resolved.len(), "Resolved permissions");
    Ok(resolved)
}

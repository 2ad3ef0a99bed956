//! Role repository.

use circles_common::models::{
    circle::{AccountId, CircleId},
    role::{EVERYONE_ROLE_NAME, NewRole, Role, RoleId},
};
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};

use super::circles;

/// Create a role in a circle.
pub async fn create_role<'e, E>(
    executor: E,
    circle_id: CircleId,
    role: &NewRole,
) -> Result<RoleId, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar(
        r#"
        INSERT INTO roles (circle_id, priority_order, name, color)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(circle_id)
    .bind(role.order)
    .bind(&role.name)
    .bind(role.color.map(|c| c.0.to_vec()))
    .fetch_one(executor)
    .await
}

/// List all roles of a circle, highest precedence first.
pub async fn list_circle_roles<'e, E>(executor: E, circle_id: CircleId) -> Result<Vec<Role>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Role>(
        "SELECT * FROM roles WHERE circle_id = ? ORDER BY priority_order, id",
    )
    .bind(circle_id)
    .fetch_all(executor)
    .await
}

/// Find a role of a circle by name.
pub async fn find_by_name<'e, E>(
    executor: E,
    circle_id: CircleId,
    name: &str,
) -> Result<Option<Role>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE circle_id = ? AND name = ?")
        .bind(circle_id)
        .bind(name)
        .fetch_optional(executor)
        .await
}

/// The `::everyone` role of a circle.
pub async fn everyone_role<'e, E>(executor: E, circle_id: CircleId) -> Result<Option<Role>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    find_by_name(executor, circle_id, EVERYONE_ROLE_NAME).await
}

/// Resolve a role name as seen from `circle_id`: the circle's own roles first, then each
/// ancestor's, nearest first.
pub async fn resolve_role_name(
    conn: &mut SqliteConnection,
    circle_id: CircleId,
    name: &str,
) -> Result<Option<RoleId>, sqlx::Error> {
    let mut chain = vec![circle_id];
    chain.extend(circles::ancestors(&mut *conn, circle_id).await?);

    for level in chain {
        if let Some(role) = find_by_name(&mut *conn, level, name).await? {
            return Ok(Some(role.id));
        }
    }
    Ok(None)
}

/// Roles an account holds in one circle, ordered by priority.
async fn roles_at_level(
    pool: &SqlitePool,
    account_id: AccountId,
    circle_id: CircleId,
) -> Result<Vec<Role>, sqlx::Error> {
    sqlx::query_as::<_, Role>(
        r#"
        SELECT r.* FROM roles r
        WHERE r.circle_id = ?
          AND EXISTS (
            SELECT 1 FROM role_members rm
            JOIN circle_members cm ON cm.id = rm.circle_member_id
            WHERE rm.role_id = r.id AND cm.account_id = ? AND cm.circle_id = ?
          )
        ORDER BY r.priority_order, r.id
        "#,
    )
    .bind(circle_id)
    .bind(account_id)
    .bind(circle_id)
    .fetch_all(pool)
    .await
}

/// Roles an account holds in a circle and in every ancestor.
///
/// Each level is ordered by priority; levels are concatenated nearest first.
pub async fn roles_of(
    pool: &SqlitePool,
    account_id: AccountId,
    circle_id: CircleId,
) -> Result<Vec<Role>, sqlx::Error> {
    let mut chain = vec![circle_id];
    chain.extend(circles::ancestors(pool, circle_id).await?);

    let mut roles = Vec::new();
    for level in chain {
        roles.extend(roles_at_level(pool, account_id, level).await?);
    }
    Ok(roles)
}

/// Id-only variant of [`roles_of`].
pub async fn role_ids_of(
    pool: &SqlitePool,
    account_id: AccountId,
    circle_id: CircleId,
) -> Result<Vec<RoleId>, sqlx::Error> {
    Ok(roles_of(pool, account_id, circle_id)
        .await?
        .into_iter()
        .map(|role| role.id)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::members;
    use crate::test_support::{insert_account, insert_circle, memory_db};
    use circles_common::models::role::{LOWEST_PRIORITY, RoleColor};

    fn role(name: &str, order: i32) -> NewRole {
        NewRole {
            name: name.into(),
            order,
            color: None,
        }
    }

    #[tokio::test]
    async fn create_and_find_roles() {
        let db = memory_db().await;
        let circle = insert_circle(&db, None, "root").await;
        let admin = create_role(
            &db.pool,
            circle,
            &NewRole {
                name: "admin".into(),
                order: 0,
                color: Some(RoleColor([1, 2, 3])),
            },
        )
        .await
        .unwrap();
        create_role(&db.pool, circle, &NewRole::everyone()).await.unwrap();

        let found = find_by_name(&db.pool, circle, "admin").await.unwrap().unwrap();
        assert_eq!(found.id, admin);
        assert_eq!(found.color, Some(RoleColor([1, 2, 3])));

        let everyone = everyone_role(&db.pool, circle).await.unwrap().unwrap();
        assert_eq!(everyone.priority_order, LOWEST_PRIORITY);
        assert_eq!(everyone.color, None);

        let names: Vec<_> = list_circle_roles(&db.pool, circle)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, ["admin", EVERYONE_ROLE_NAME]);
    }

    #[tokio::test]
    async fn duplicate_role_name_in_circle_is_rejected() {
        let db = memory_db().await;
        let circle = insert_circle(&db, None, "root").await;
        create_role(&db.pool, circle, &role("mod", 1)).await.unwrap();
        let err = create_role(&db.pool, circle, &role("mod", 2)).await.unwrap_err();
        assert!(crate::sqlite::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn roles_span_ancestors_nearest_first() {
        let db = memory_db().await;
        let account = insert_account(&db, "alice").await;
        let root = insert_circle(&db, None, "root").await;
        let child = insert_circle(&db, Some(root), "child").await;

        create_role(&db.pool, root, &NewRole::everyone()).await.unwrap();
        let root_admin = create_role(&db.pool, root, &role("admin", 0)).await.unwrap();
        create_role(&db.pool, child, &NewRole::everyone()).await.unwrap();
        let child_mod = create_role(&db.pool, child, &role("mod", 5)).await.unwrap();
        // Held by nobody.
        create_role(&db.pool, child, &role("unused", 1)).await.unwrap();

        members::add_member(&db.pool, root, account).await.unwrap();
        members::add_member(&db.pool, child, account).await.unwrap();
        members::assign_role(&db.pool, root, account, root_admin).await.unwrap();
        members::assign_role(&db.pool, child, account, child_mod).await.unwrap();

        let held: Vec<_> = roles_of(&db.pool, account, child)
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.circle_id, r.name))
            .collect();
        assert_eq!(
            held,
            vec![
                (child, "mod".to_string()),
                (child, EVERYONE_ROLE_NAME.to_string()),
                (root, "admin".to_string()),
                (root, EVERYONE_ROLE_NAME.to_string()),
            ]
        );

        let outsider = insert_account(&db, "bob").await;
        assert!(role_ids_of(&db.pool, outsider, child).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn role_names_resolve_through_ancestors() {
        let db = memory_db().await;
        let root = insert_circle(&db, None, "root").await;
        let child = insert_circle(&db, Some(root), "child").await;
        let root_everyone = create_role(&db.pool, root, &NewRole::everyone()).await.unwrap();
        let root_admin = create_role(&db.pool, root, &role("admin", 0)).await.unwrap();
        let child_everyone = create_role(&db.pool, child, &NewRole::everyone()).await.unwrap();

        let mut conn = db.pool.acquire().await.unwrap();
        assert_eq!(
            resolve_role_name(&mut conn, child, EVERYONE_ROLE_NAME).await.unwrap(),
            Some(child_everyone)
        );
        assert_eq!(resolve_role_name(&mut conn, child, "admin").await.unwrap(), Some(root_admin));
        assert_eq!(
            resolve_role_name(&mut conn, root, EVERYONE_ROLE_NAME).await.unwrap(),
            Some(root_everyone)
        );
        assert_eq!(resolve_role_name(&mut conn, child, "ghost").await.unwrap(), None);
    }
}

//! Circle repository: lookups and hierarchy walks.
//!
//! Ancestor chains come from a single recursive CTE, nearest parent first. The walk stops
//! after [`MAX_HIERARCHY_DEPTH`] levels so a corrupted (cyclic) parent chain still terminates.

use circles_common::models::circle::{Circle, CircleId};
use sqlx::{Executor, Sqlite, SqlitePool};

pub const MAX_HIERARCHY_DEPTH: i64 = 256;

/// Find a circle by ID.
pub async fn find_by_id<'e, E>(executor: E, id: CircleId) -> Result<Option<Circle>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Circle>("SELECT * FROM circles WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Id of the sibling called `name` under `parent_id` (roots when `None`).
pub async fn find_sibling_id<'e, E>(
    executor: E,
    parent_id: Option<CircleId>,
    name: &str,
) -> Result<Option<CircleId>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT id FROM circles WHERE parent_id IS ? AND name = ?")
        .bind(parent_id)
        .bind(name)
        .fetch_optional(executor)
        .await
}

/// All root circles.
pub async fn list_roots(pool: &SqlitePool) -> Result<Vec<Circle>, sqlx::Error> {
    sqlx::query_as::<_, Circle>("SELECT * FROM circles WHERE parent_id IS NULL ORDER BY id")
        .fetch_all(pool)
        .await
}

/// The parent of a circle, `None` for roots and unknown circles.
pub async fn parent(pool: &SqlitePool, id: CircleId) -> Result<Option<Circle>, sqlx::Error> {
    sqlx::query_as::<_, Circle>(
        r#"
        SELECT p.* FROM circles c
        JOIN circles p ON p.id = c.parent_id
        WHERE c.id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Direct children of a circle.
pub async fn children(pool: &SqlitePool, id: CircleId) -> Result<Vec<Circle>, sqlx::Error> {
    sqlx::query_as::<_, Circle>("SELECT * FROM circles WHERE parent_id = ? ORDER BY id")
        .bind(id)
        .fetch_all(pool)
        .await
}

/// Ancestor ids, nearest first and root last. `id` itself is excluded.
pub async fn ancestors<'e, E>(executor: E, id: CircleId) -> Result<Vec<CircleId>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar(
        r#"
        WITH RECURSIVE chain(id, depth) AS (
            SELECT parent_id, 1 FROM circles
            WHERE id = ? AND parent_id IS NOT NULL
            UNION ALL
            SELECT c.parent_id, chain.depth + 1 FROM circles c
            JOIN chain ON c.id = chain.id
            WHERE c.parent_id IS NOT NULL AND chain.depth < ?
        )
        SELECT id FROM chain ORDER BY depth
        "#,
    )
    .bind(id)
    .bind(MAX_HIERARCHY_DEPTH)
    .fetch_all(executor)
    .await
}

/// Hydrated ancestors in the same order as [`ancestors`].
pub async fn parents(pool: &SqlitePool, id: CircleId) -> Result<Vec<Circle>, sqlx::Error> {
    sqlx::query_as::<_, Circle>(
        r#"
        WITH RECURSIVE chain(id, depth) AS (
            SELECT parent_id, 1 FROM circles
            WHERE id = ? AND parent_id IS NOT NULL
            UNION ALL
            SELECT c.parent_id, chain.depth + 1 FROM circles c
            JOIN chain ON c.id = chain.id
            WHERE c.parent_id IS NOT NULL AND chain.depth < ?
        )
        SELECT c.* FROM chain
        JOIN circles c ON c.id = chain.id
        ORDER BY chain.depth
        "#,
    )
    .bind(id)
    .bind(MAX_HIERARCHY_DEPTH)
    .fetch_all(pool)
    .await
}

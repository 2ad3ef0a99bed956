//! Circle provisioning: atomic creation and declarative reconciliation.
//!
//! A circle is created together with its roles and grants in one transaction. Applying a
//! definition to a circle that already exists diffs it against the stored state instead,
//! writing only what changed. Every early return drops the open transaction, which rolls
//! it back.
//!
//! When the parent has default subcircle permissions, they form the base grant set of the
//! new circle's `::everyone` role and explicit `::everyone` entries override them. Create
//! and reconcile share that merge, so re-applying an unchanged definition writes nothing.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use circles_common::circle_spec::CircleSpec;
use circles_common::codec;
use circles_common::error::{CirclesError, CirclesResult};
use circles_common::models::{
    circle::{Circle, CircleId, NewCircle},
    role::{EVERYONE_ROLE_NAME, NewRole, RoleId},
};
use circles_common::permissions::{PermissionCatalog, PermissionNumber, PermissionSet};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use super::{circles, permissions::insert_grant, roles};
use crate::sqlite::is_unique_violation;

/// Writes performed by [`reconcile_circle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub circle_updated: bool,
    pub roles_inserted: usize,
    pub roles_updated: usize,
    pub roles_deleted: usize,
    pub permissions_inserted: usize,
    pub permissions_updated: usize,
    pub permissions_deleted: usize,
}

impl ReconcileReport {
    /// Total number of rows written.
    pub fn writes(&self) -> usize {
        usize::from(self.circle_updated)
            + self.roles_inserted
            + self.roles_updated
            + self.roles_deleted
            + self.permissions_inserted
            + self.permissions_updated
            + self.permissions_deleted
    }

    pub fn is_noop(&self) -> bool {
        self.writes() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Created(CircleId),
    Reconciled { id: CircleId, report: ReconcileReport },
}

impl ProvisionOutcome {
    pub fn circle_id(&self) -> CircleId {
        match self {
            Self::Created(id) | Self::Reconciled { id, .. } => *id,
        }
    }
}

/// Create a circle with its roles and grants.
///
/// `permissions` maps role names to grants inside the new circle. Names that are not among
/// `roles` are looked up in the ancestors, nearest first.
pub async fn create_circle(
    pool: &SqlitePool,
    catalog: &PermissionCatalog,
    circle: &NewCircle,
    roles: &[NewRole],
    permissions: &BTreeMap<String, PermissionSet>,
) -> CirclesResult<CircleId> {
    if let Some(existing_id) = circles::find_sibling_id(pool, circle.parent_id, &circle.name).await? {
        return Err(duplicate_name(existing_id, circle));
    }
    check_role_names(roles)?;
    check_numbers(catalog, circle, permissions)?;

    let mut tx = pool.begin().await?;

    let parent = load_parent(&mut tx, circle.parent_id).await?;

    let circle_id = match insert_circle(&mut tx, circle).await {
        Ok(id) => id,
        Err(e) if is_unique_violation(&e) => {
            // Lost a race with a concurrent create of the same name.
            drop(tx);
            return Err(
                match circles::find_sibling_id(pool, circle.parent_id, &circle.name).await? {
                    Some(existing_id) => duplicate_name(existing_id, circle),
                    None => e.into(),
                },
            );
        }
        Err(e) => return Err(e.into()),
    };

    for role in with_everyone(roles) {
        roles::create_role(&mut *tx, circle_id, &role).await?;
    }

    for ((role_id, number), granted) in resolve_grants(&mut tx, circle_id, parent.as_ref(), permissions).await? {
        insert_grant(&mut *tx, role_id, circle_id, number, granted).await?;
    }

    tx.commit().await?;
    tracing::info!(circle_id, name = %circle.name, parent_id = ?circle.parent_id, "Circle created");
    Ok(circle_id)
}

/// Bring an existing circle in line with a definition.
///
/// Owner, communication types and default subcircle permissions are updated when they
/// differ. Roles and grants missing from the definition are deleted, new ones inserted and
/// changed ones updated.
pub async fn reconcile_circle(
    pool: &SqlitePool,
    catalog: &PermissionCatalog,
    existing_id: CircleId,
    circle: &NewCircle,
    roles: &[NewRole],
    permissions: &BTreeMap<String, PermissionSet>,
) -> CirclesResult<ReconcileReport> {
    check_role_names(roles)?;
    check_numbers(catalog, circle, permissions)?;

    let mut report = ReconcileReport::default();
    let mut tx = pool.begin().await?;

    let existing = circles::find_by_id(&mut *tx, existing_id)
        .await?
        .ok_or_else(|| CirclesError::not_found("Circle"))?;
    let parent = load_parent(&mut tx, existing.parent_id).await?;

    report.circle_updated = update_attributes(&mut tx, &existing, circle).await?;

    // Roles, diffed by name.
    let mut stored: HashMap<String, _> = roles::list_circle_roles(&mut *tx, existing_id)
        .await?
        .into_iter()
        .map(|role| (role.name.clone(), role))
        .collect();

    for role in with_everyone(roles) {
        match stored.remove(&role.name) {
            Some(current) if current.priority_order == role.order && current.color == role.color => {}
            Some(current) => {
                sqlx::query("UPDATE roles SET priority_order = ?, color = ? WHERE id = ?")
                    .bind(role.order)
                    .bind(role.color.map(|c| c.0.to_vec()))
                    .bind(current.id)
                    .execute(&mut *tx)
                    .await?;
                report.roles_updated += 1;
            }
            None => {
                roles::create_role(&mut *tx, existing_id, &role).await?;
                report.roles_inserted += 1;
            }
        }
    }
    for (name, leftover) in stored {
        sqlx::query("DELETE FROM roles WHERE id = ?")
            .bind(leftover.id)
            .execute(&mut *tx)
            .await?;
        tracing::debug!(circle_id = existing_id, role = %name, "Role removed");
        report.roles_deleted += 1;
    }

    // Grants, diffed by (role, permission number).
    let mut current: HashMap<(RoleId, PermissionNumber), (i64, bool)> = sqlx::query_as::<_, (i64, RoleId, PermissionNumber, bool)>(
        "SELECT id, role_id, permission_number, granted FROM role_permissions WHERE circle_id = ?",
    )
    .bind(existing_id)
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .map(|(row_id, role_id, number, granted)| ((role_id, number), (row_id, granted)))
    .collect();

    for (key, granted) in resolve_grants(&mut tx, existing_id, parent.as_ref(), permissions).await? {
        match current.remove(&key) {
            Some((_, stored_granted)) if stored_granted == granted => {}
            Some((row_id, _)) => {
                sqlx::query("UPDATE role_permissions SET granted = ? WHERE id = ?")
                    .bind(granted)
                    .bind(row_id)
                    .execute(&mut *tx)
                    .await?;
                report.permissions_updated += 1;
            }
            None => {
                let (role_id, number) = key;
                insert_grant(&mut *tx, role_id, existing_id, number, granted).await?;
                report.permissions_inserted += 1;
            }
        }
    }
    for (row_id, _) in current.into_values() {
        sqlx::query("DELETE FROM role_permissions WHERE id = ?")
            .bind(row_id)
            .execute(&mut *tx)
            .await?;
        report.permissions_deleted += 1;
    }

    tx.commit().await?;
    tracing::info!(
        circle_id = existing_id,
        name = %circle.name,
        writes = report.writes(),
        "Circle reconciled"
    );
    Ok(report)
}

/// Create the circle, or reconcile it when a sibling of the same name already exists.
pub async fn apply_circle_spec(
    pool: &SqlitePool,
    catalog: &PermissionCatalog,
    spec: &CircleSpec,
) -> CirclesResult<ProvisionOutcome> {
    match create_circle(pool, catalog, &spec.circle, &spec.roles, &spec.permissions).await {
        Ok(id) => Ok(ProvisionOutcome::Created(id)),
        Err(CirclesError::DuplicateCircleName { existing_id, .. }) => {
            let report =
                reconcile_circle(pool, catalog, existing_id, &spec.circle, &spec.roles, &spec.permissions)
                    .await?;
            Ok(ProvisionOutcome::Reconciled {
                id: existing_id,
                report,
            })
        }
        Err(e) => Err(e),
    }
}

/// Apply definitions in order. The first failure stops the run and names its entry.
pub async fn provision(
    pool: &SqlitePool,
    catalog: &PermissionCatalog,
    specs: &[CircleSpec],
) -> CirclesResult<Vec<ProvisionOutcome>> {
    let mut outcomes = Vec::with_capacity(specs.len());
    for spec in specs {
        let outcome = apply_circle_spec(pool, catalog, spec)
            .await
            .map_err(|source| CirclesError::Provisioning {
                circle: spec.name().to_string(),
                source: Box::new(source),
            })?;
        outcomes.push(outcome);
    }
    tracing::info!(count = outcomes.len(), "Provisioning complete");
    Ok(outcomes)
}

fn duplicate_name(existing_id: CircleId, circle: &NewCircle) -> CirclesError {
    CirclesError::DuplicateCircleName {
        existing_id,
        parent_id: circle.parent_id,
        name: circle.name.clone(),
    }
}

fn check_role_names(roles: &[NewRole]) -> CirclesResult<()> {
    let mut seen = HashSet::with_capacity(roles.len());
    for role in roles {
        if !seen.insert(role.name.as_str()) {
            return Err(CirclesError::DuplicateRoleName {
                name: role.name.clone(),
            });
        }
    }
    Ok(())
}

fn check_numbers(
    catalog: &PermissionCatalog,
    circle: &NewCircle,
    permissions: &BTreeMap<String, PermissionSet>,
) -> CirclesResult<()> {
    let sets = circle.default_subcircle_permissions.iter().chain(permissions.values());
    for set in sets {
        if let Some(number) = catalog.first_unknown(set) {
            return Err(CirclesError::configuration(format!("Unknown permission number {number}")));
        }
    }
    Ok(())
}

/// The supplied roles plus a synthesized `::everyone` when it is missing.
fn with_everyone(roles: &[NewRole]) -> Vec<NewRole> {
    let mut all = roles.to_vec();
    if !all.iter().any(|role| role.name == EVERYONE_ROLE_NAME) {
        all.push(NewRole::everyone());
    }
    all
}

async fn load_parent(
    conn: &mut SqliteConnection,
    parent_id: Option<CircleId>,
) -> CirclesResult<Option<Circle>> {
    match parent_id {
        Some(id) => circles::find_by_id(&mut *conn, id)
            .await?
            .map(Some)
            .ok_or_else(|| CirclesError::not_found("Parent circle")),
        None => Ok(None),
    }
}

async fn insert_circle(conn: &mut SqliteConnection, circle: &NewCircle) -> Result<CircleId, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO circles (parent_id, owner_id, name, created, com_type,
                             default_subcircle_com_type, default_subcircle_permissions)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(circle.parent_id)
    .bind(circle.owner_id)
    .bind(&circle.name)
    .bind(Utc::now())
    .bind(circle.com_type)
    .bind(circle.default_subcircle_com_type)
    .bind(encoded_defaults(circle))
    .fetch_one(conn)
    .await
}

fn encoded_defaults(circle: &NewCircle) -> Option<Vec<u8>> {
    circle
        .default_subcircle_permissions
        .as_ref()
        .filter(|set| !set.is_empty())
        .map(codec::encode)
}

/// Issue one UPDATE covering the attributes that differ. Returns whether anything changed.
async fn update_attributes(
    conn: &mut SqliteConnection,
    existing: &Circle,
    circle: &NewCircle,
) -> CirclesResult<bool> {
    let stored_defaults = existing.default_subcircle_permissions.as_ref().map(codec::encode);
    let wanted_defaults = encoded_defaults(circle);

    let mut update = QueryBuilder::<Sqlite>::new("UPDATE circles SET ");
    let mut changed = false;
    {
        let mut columns = update.separated(", ");
        if existing.owner_id != circle.owner_id {
            columns.push("owner_id = ").push_bind_unseparated(circle.owner_id);
            changed = true;
        }
        if existing.com_type != circle.com_type {
            columns.push("com_type = ").push_bind_unseparated(circle.com_type);
            changed = true;
        }
        if existing.default_subcircle_com_type != circle.default_subcircle_com_type {
            columns
                .push("default_subcircle_com_type = ")
                .push_bind_unseparated(circle.default_subcircle_com_type);
            changed = true;
        }
        if stored_defaults != wanted_defaults {
            columns
                .push("default_subcircle_permissions = ")
                .push_bind_unseparated(wanted_defaults);
            changed = true;
        }
    }

    if !changed {
        return Ok(false);
    }

    update.push(" WHERE id = ").push_bind(existing.id);
    update.build().execute(&mut *conn).await?;
    Ok(true)
}

/// Merge the parent's defaults into `::everyone`, then resolve every role name.
async fn resolve_grants(
    conn: &mut SqliteConnection,
    circle_id: CircleId,
    parent: Option<&Circle>,
    permissions: &BTreeMap<String, PermissionSet>,
) -> CirclesResult<BTreeMap<(RoleId, PermissionNumber), bool>> {
    let mut planned = permissions.clone();
    if let Some(defaults) = parent.and_then(|p| p.default_subcircle_permissions.as_ref()) {
        let mut everyone = defaults.clone();
        if let Some(explicit) = planned.get(EVERYONE_ROLE_NAME) {
            everyone.merge(explicit);
        }
        planned.insert(EVERYONE_ROLE_NAME.to_string(), everyone);
    }

    let mut grants = BTreeMap::new();
    for (role_name, set) in planned {
        let role_id = roles::resolve_role_name(&mut *conn, circle_id, &role_name)
            .await?
            .ok_or_else(|| CirclesError::not_found(format!("Role {role_name}")))?;
        for (number, granted) in set {
            grants.insert((role_id, number), granted);
        }
    }
    Ok(grants)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{members, permissions};
    use crate::test_support::{insert_account, memory_db};
    use circles_common::circle_spec;
    use circles_common::models::circle::CommunicationType;
    use circles_common::models::role::{LOWEST_PRIORITY, RoleColor};
    use circles_common::permissions::{CREATE_SUBCIRCLE, Grant, SEND_CONTENT, VIEW_CIRCLE};

    fn catalog() -> PermissionCatalog {
        PermissionCatalog::builtin().unwrap()
    }

    fn new_circle(parent_id: Option<CircleId>, name: &str) -> NewCircle {
        NewCircle {
            parent_id,
            owner_id: 1,
            name: name.into(),
            com_type: CommunicationType::Post,
            default_subcircle_com_type: None,
            default_subcircle_permissions: None,
        }
    }

    fn role(name: &str, order: i32) -> NewRole {
        NewRole {
            name: name.into(),
            order,
            color: None,
        }
    }

    fn grants(entries: &[(&str, &[(PermissionNumber, bool)])]) -> BTreeMap<String, PermissionSet> {
        entries
            .iter()
            .map(|(name, set)| (name.to_string(), set.iter().copied().collect()))
            .collect()
    }

    async fn grant_count(pool: &SqlitePool, circle_id: CircleId) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM role_permissions WHERE circle_id = ?")
            .bind(circle_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_synthesizes_everyone_with_lowest_priority() {
        let db = memory_db().await;
        let id = create_circle(
            &db.pool,
            &catalog(),
            &new_circle(None, "root"),
            &[role("admin", 0)],
            &grants(&[("admin", &[(CREATE_SUBCIRCLE.number, true)])]),
        )
        .await
        .unwrap();

        let stored = roles::list_circle_roles(&db.pool, id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].name, EVERYONE_ROLE_NAME);
        assert_eq!(stored[1].priority_order, LOWEST_PRIORITY);
        assert_eq!(grant_count(&db.pool, id).await, 1);
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected_with_first_id() {
        let db = memory_db().await;
        let first = create_circle(&db.pool, &catalog(), &new_circle(None, "root"), &[], &BTreeMap::new())
            .await
            .unwrap();

        let err = create_circle(&db.pool, &catalog(), &new_circle(None, "root"), &[], &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CirclesError::DuplicateCircleName { existing_id, .. } if existing_id == first));

        // The same name under different parents is fine.
        let a = create_circle(&db.pool, &catalog(), &new_circle(Some(first), "a"), &[], &BTreeMap::new())
            .await
            .unwrap();
        create_circle(&db.pool, &catalog(), &new_circle(Some(a), "a"), &[], &BTreeMap::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn storage_rejects_sibling_name_clashes() {
        let db = memory_db().await;
        let mut conn = db.pool.acquire().await.unwrap();

        let root = insert_circle(&mut conn, &new_circle(None, "same")).await.unwrap();
        let err = insert_circle(&mut conn, &new_circle(None, "same")).await.unwrap_err();
        assert!(is_unique_violation(&err));

        insert_circle(&mut conn, &new_circle(Some(root), "child")).await.unwrap();
        let err = insert_circle(&mut conn, &new_circle(Some(root), "child")).await.unwrap_err();
        assert!(is_unique_violation(&err));

        // A child may share a root's name.
        insert_circle(&mut conn, &new_circle(Some(root), "same")).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_have_one_winner() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = crate::Database::connect(&circles_common::config::DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("circles.db").display()),
            max_connections: 8,
            min_connections: 1,
        })
        .await
        .unwrap();
        db.migrate().await.unwrap();
        let catalog = std::sync::Arc::new(catalog());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let pool = db.pool.clone();
                let catalog = catalog.clone();
                tokio::spawn(async move {
                    create_circle(&pool, &catalog, &new_circle(None, "contested"), &[], &BTreeMap::new()).await
                })
            })
            .collect();

        let mut winners = Vec::new();
        let mut losers = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(id) => winners.push(id),
                Err(CirclesError::DuplicateCircleName { existing_id, .. }) => losers.push(existing_id),
                Err(other) => panic!("unexpected error {other}"),
            }
        }

        assert_eq!(winners.len(), 1);
        assert_eq!(losers.len(), 7);
        assert!(losers.iter().all(|id| *id == winners[0]));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM circles WHERE name = 'contested'")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn duplicate_role_names_are_rejected() {
        let db = memory_db().await;
        let err = create_circle(
            &db.pool,
            &catalog(),
            &new_circle(None, "root"),
            &[role("mod", 1), role("mod", 2)],
            &BTreeMap::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CirclesError::DuplicateRoleName { ref name } if name == "mod"));
        assert!(circles::list_roots(&db.pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_create_rolls_back() {
        let db = memory_db().await;
        let err = create_circle(
            &db.pool,
            &catalog(),
            &new_circle(None, "root"),
            &[role("admin", 0)],
            &grants(&[("ghost", &[(VIEW_CIRCLE.number, true)])]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CirclesError::NotFound { .. }));
        assert!(circles::list_roots(&db.pool).await.unwrap().is_empty());

        let unknown = create_circle(
            &db.pool,
            &catalog(),
            &new_circle(None, "root"),
            &[],
            &grants(&[(EVERYONE_ROLE_NAME, &[(999, true)])]),
        )
        .await
        .unwrap_err();
        assert!(matches!(unknown, CirclesError::Configuration { .. }));

        let orphan = create_circle(&db.pool, &catalog(), &new_circle(Some(77), "x"), &[], &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(orphan, CirclesError::NotFound { .. }));
    }

    #[tokio::test]
    async fn ancestor_roles_can_be_overridden_in_a_subcircle() {
        let db = memory_db().await;
        let account = insert_account(&db, "alice").await;
        let root = create_circle(
            &db.pool,
            &catalog(),
            &new_circle(None, "root"),
            &[role("admin", 0)],
            &grants(&[("admin", &[(SEND_CONTENT.number, true)])]),
        )
        .await
        .unwrap();
        let child = create_circle(
            &db.pool,
            &catalog(),
            &new_circle(Some(root), "quiet"),
            &[],
            &grants(&[("admin", &[(SEND_CONTENT.number, false)])]),
        )
        .await
        .unwrap();

        let admin = roles::find_by_name(&db.pool, root, "admin").await.unwrap().unwrap();
        members::add_member(&db.pool, root, account).await.unwrap();
        members::assign_role(&db.pool, root, account, admin.id).await.unwrap();

        let held = roles::role_ids_of(&db.pool, account, child).await.unwrap();
        let in_child = permissions::effective_all(&db.pool, child, &held).await.unwrap();
        assert_eq!(in_child.get(SEND_CONTENT.number), Grant::Denied);
        let in_root = permissions::effective_all(&db.pool, root, &held).await.unwrap();
        assert_eq!(in_root.get(SEND_CONTENT.number), Grant::Granted);
    }

    #[tokio::test]
    async fn reapplying_a_definition_writes_nothing() {
        let db = memory_db().await;
        let json = r#"{
            "root": {
                "owner_id": "1", "com_type": 0,
                "default_subcircle": { "com_type": 1, "permissions": { "view_circle": true } },
                "roles": { "admin": { "color": "ff0000", "order": 0 }, "member": {} },
                "permissions": {
                    "admin": { "create_subcircle": true },
                    "::everyone": { "view_circle": true, "send_content": false }
                }
            },
            "child": {
                "parent_id": "1", "owner_id": "1", "com_type": 1,
                "permissions": { "::everyone": { "send_content": true }, "admin": { "delete_subcircle": true } }
            }
        }"#;
        let specs = circle_spec::parse(json, &catalog()).unwrap();

        let first = provision(&db.pool, &catalog(), &specs).await.unwrap();
        assert!(matches!(first[0], ProvisionOutcome::Created(1)));
        assert!(matches!(first[1], ProvisionOutcome::Created(_)));

        let second = provision(&db.pool, &catalog(), &specs).await.unwrap();
        for outcome in &second {
            match outcome {
                ProvisionOutcome::Reconciled { report, .. } => assert!(report.is_noop(), "{report:?}"),
                other => panic!("expected reconcile, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn reconcile_diffs_roles_and_grants() {
        let db = memory_db().await;
        let id = create_circle(
            &db.pool,
            &catalog(),
            &new_circle(None, "root"),
            &[role("admin", 0), role("old", 5)],
            &grants(&[
                ("admin", &[(CREATE_SUBCIRCLE.number, true), (SEND_CONTENT.number, true)]),
                (EVERYONE_ROLE_NAME, &[(VIEW_CIRCLE.number, true)]),
            ]),
        )
        .await
        .unwrap();

        let mut changed = new_circle(None, "root");
        changed.owner_id = 2;
        changed.default_subcircle_com_type = Some(CommunicationType::Message);
        let report = reconcile_circle(
            &db.pool,
            &catalog(),
            id,
            &changed,
            &[
                NewRole {
                    name: "admin".into(),
                    order: 0,
                    color: Some(RoleColor([0, 0, 0xff])),
                },
                role("new", 3),
            ],
            &grants(&[
                ("admin", &[(CREATE_SUBCIRCLE.number, false)]),
                (EVERYONE_ROLE_NAME, &[(VIEW_CIRCLE.number, true)]),
                ("new", &[(SEND_CONTENT.number, true)]),
            ]),
        )
        .await
        .unwrap();

        assert_eq!(
            report,
            ReconcileReport {
                circle_updated: true,
                roles_inserted: 1,
                roles_updated: 1,
                roles_deleted: 1,
                permissions_inserted: 1,
                permissions_updated: 1,
                permissions_deleted: 1,
            }
        );

        let stored = circles::find_by_id(&db.pool, id).await.unwrap().unwrap();
        assert_eq!(stored.owner_id, 2);
        assert_eq!(stored.default_subcircle_com_type, Some(CommunicationType::Message));

        let names: Vec<_> = roles::list_circle_roles(&db.pool, id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, ["admin", "new", EVERYONE_ROLE_NAME]);
        assert_eq!(grant_count(&db.pool, id).await, 3);
    }

    #[tokio::test]
    async fn default_subcircle_permissions_reach_new_children() {
        let db = memory_db().await;
        let account = insert_account(&db, "alice").await;
        let mut parent = new_circle(None, "root");
        parent.default_subcircle_permissions =
            Some([(VIEW_CIRCLE.number, true), (SEND_CONTENT.number, true)].into_iter().collect());
        let root = create_circle(&db.pool, &catalog(), &parent, &[], &BTreeMap::new())
            .await
            .unwrap();

        let child_permissions = grants(&[(EVERYONE_ROLE_NAME, &[(SEND_CONTENT.number, false)])]);
        let child = create_circle(
            &db.pool,
            &catalog(),
            &new_circle(Some(root), "child"),
            &[],
            &child_permissions,
        )
        .await
        .unwrap();

        members::add_member(&db.pool, child, account).await.unwrap();
        let held = roles::role_ids_of(&db.pool, account, child).await.unwrap();
        let effective = permissions::effective_all(&db.pool, child, &held).await.unwrap();
        assert_eq!(effective.get(VIEW_CIRCLE.number), Grant::Granted);
        assert_eq!(effective.get(SEND_CONTENT.number), Grant::Denied);

        let report = reconcile_circle(
            &db.pool,
            &catalog(),
            child,
            &new_circle(Some(root), "child"),
            &[],
            &child_permissions,
        )
        .await
        .unwrap();
        assert!(report.is_noop(), "{report:?}");
    }

    #[tokio::test]
    async fn provisioning_stops_at_first_failure() {
        let db = memory_db().await;
        let json = r#"{
            "good": { "owner_id": "1", "com_type": 0 },
            "bad": { "owner_id": "1", "com_type": 0, "permissions": { "ghost": { "view_circle": true } } },
            "never": { "owner_id": "1", "com_type": 0 }
        }"#;
        let specs = circle_spec::parse(json, &catalog()).unwrap();

        let err = provision(&db.pool, &catalog(), &specs).await.unwrap_err();
        assert!(matches!(err, CirclesError::Provisioning { ref circle, .. } if circle == "bad"));

        let roots: Vec<_> = circles::list_roots(&db.pool)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(roots, ["good"]);
    }
}

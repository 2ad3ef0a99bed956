//! Circle routes: the hierarchy, the caller's roles and permissions, joining, and
//! subcircle creation.
//!
//! Reads of the hierarchy are public. Everything that depends on who is asking sits behind
//! the session middleware.

use std::collections::BTreeMap;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use circles_common::{
    error::{CirclesError, CirclesResult},
    models::{
        circle::{
            Circle, CircleId, CircleResponse, CommunicationType, CreateSubcircleRequest,
            HierarchyResponse, NewCircle,
        },
        role::RoleResponse,
    },
    permissions::{CREATE_SUBCIRCLE, Permission, PermissionState},
    validation::validate_request,
};
use circles_db::repository::{circles, members, permissions, provisioning, roles};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    AppState,
    middleware::{AuthContext, session_middleware},
};

pub fn router(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    let public = Router::new()
        .route("/circles", get(list_roots))
        .route("/circles/{circle_id}", get(get_circle))
        .route("/circles/{circle_id}/parent", get(get_parent))
        .route("/circles/{circle_id}/parents", get(get_parents))
        .route("/circles/{circle_id}/children", get(get_children))
        .route("/circles/{circle_id}/hierarchy", get(get_hierarchy));

    let authed = Router::new()
        .route("/circles/{circle_id}/children", post(create_subcircle))
        .route("/circles/{circle_id}/join", post(join_circle))
        .route("/circles/{circle_id}/roles", get(get_my_roles))
        .route("/circles/{circle_id}/roles/permissions", get(get_my_permissions))
        .route_layer(middleware::from_fn_with_state(state.clone(), session_middleware));

    public.merge(authed)
}

fn respond(state: &AppState, circles: Vec<Circle>) -> Vec<CircleResponse> {
    circles
        .into_iter()
        .map(|c| CircleResponse::from_circle(c, &state.catalog))
        .collect()
}

async fn require_circle(state: &AppState, circle_id: CircleId) -> CirclesResult<Circle> {
    circles::find_by_id(&state.db.pool, circle_id)
        .await?
        .ok_or_else(|| CirclesError::not_found("Circle"))
}

/// GET /api/circles
async fn list_roots(State(state): State<Arc<AppState>>) -> CirclesResult<Json<Vec<CircleResponse>>> {
    let roots = circles::list_roots(&state.db.pool).await?;
    Ok(Json(respond(&state, roots)))
}

/// GET /api/circles/{circle_id}
async fn get_circle(
    State(state): State<Arc<AppState>>,
    Path(circle_id): Path<CircleId>,
) -> CirclesResult<Json<CircleResponse>> {
    let circle = require_circle(&state, circle_id).await?;
    Ok(Json(CircleResponse::from_circle(circle, &state.catalog)))
}

/// GET /api/circles/{circle_id}/parent
async fn get_parent(
    State(state): State<Arc<AppState>>,
    Path(circle_id): Path<CircleId>,
) -> CirclesResult<Json<CircleResponse>> {
    require_circle(&state, circle_id).await?;
    let parent = circles::parent(&state.db.pool, circle_id)
        .await?
        .ok_or_else(|| CirclesError::not_found("Parent circle"))?;
    Ok(Json(CircleResponse::from_circle(parent, &state.catalog)))
}

/// GET /api/circles/{circle_id}/parents
///
/// Nearest ancestor first, root last.
async fn get_parents(
    State(state): State<Arc<AppState>>,
    Path(circle_id): Path<CircleId>,
) -> CirclesResult<Json<Vec<CircleResponse>>> {
    require_circle(&state, circle_id).await?;
    let parents = circles::parents(&state.db.pool, circle_id).await?;
    Ok(Json(respond(&state, parents)))
}

/// GET /api/circles/{circle_id}/children
async fn get_children(
    State(state): State<Arc<AppState>>,
    Path(circle_id): Path<CircleId>,
) -> CirclesResult<Json<Vec<CircleResponse>>> {
    require_circle(&state, circle_id).await?;
    let children = circles::children(&state.db.pool, circle_id).await?;
    Ok(Json(respond(&state, children)))
}

/// GET /api/circles/{circle_id}/hierarchy
async fn get_hierarchy(
    State(state): State<Arc<AppState>>,
    Path(circle_id): Path<CircleId>,
) -> CirclesResult<Json<HierarchyResponse>> {
    require_circle(&state, circle_id).await?;
    let parents = circles::parents(&state.db.pool, circle_id).await?;
    let children = circles::children(&state.db.pool, circle_id).await?;
    Ok(Json(HierarchyResponse {
        parents: respond(&state, parents),
        children: respond(&state, children),
    }))
}

/// GET /api/circles/{circle_id}/roles
///
/// The caller's roles here and in every ancestor, keyed by name. When two levels use the same
/// name the nearest one is reported.
async fn get_my_roles(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(circle_id): Path<CircleId>,
) -> CirclesResult<Json<BTreeMap<String, RoleResponse>>> {
    require_circle(&state, circle_id).await?;

    let mut by_name = BTreeMap::new();
    for role in roles::roles_of(&state.db.pool, auth.account_id, circle_id).await? {
        by_name
            .entry(role.name.clone())
            .or_insert_with(|| RoleResponse::from(role));
    }
    Ok(Json(by_name))
}

#[derive(Debug, Default, Deserialize)]
struct PermissionsQuery {
    names: Option<String>,
}

/// Split a `names=a+b` filter into permission names. `+` may arrive decoded as a space.
fn requested_names(names: &str) -> Vec<String> {
    names
        .split(|c: char| c == '+' || c.is_whitespace())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// GET /api/circles/{circle_id}/roles/permissions?names=a+b
///
/// The caller's effective permissions. Every requested permission (or every known one
/// without a filter) is reported; anything no role grants comes back as not granted.
async fn get_my_permissions(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(circle_id): Path<CircleId>,
    Query(query): Query<PermissionsQuery>,
) -> CirclesResult<Json<BTreeMap<&'static str, PermissionState>>> {
    require_circle(&state, circle_id).await?;

    let names = query.names.as_deref().map(requested_names).unwrap_or_default();
    let wanted: Vec<Permission> = if names.is_empty() {
        state.catalog.iter().copied().collect()
    } else {
        names
            .iter()
            .map(|name| {
                state.catalog.by_name(name).copied().ok_or_else(|| CirclesError::Validation {
                    message: format!("Bad permission name {name}"),
                })
            })
            .collect::<CirclesResult<_>>()?
    };

    let role_ids = roles::role_ids_of(&state.db.pool, auth.account_id, circle_id).await?;
    let resolved = if names.is_empty() {
        permissions::effective_all(&state.db.pool, circle_id, &role_ids).await?
    } else {
        let numbers: Vec<_> = wanted.iter().map(|p| p.number).collect();
        permissions::effective_some(&state.db.pool, circle_id, &role_ids, &numbers).await?
    };

    Ok(Json(
        wanted
            .into_iter()
            .map(|p| {
                (
                    p.name,
                    PermissionState {
                        display_name: p.display_name,
                        granted: resolved.is_granted(p.number),
                    },
                )
            })
            .collect(),
    ))
}

/// POST /api/circles/{circle_id}/join
async fn join_circle(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(circle_id): Path<CircleId>,
) -> CirclesResult<StatusCode> {
    members::add_member(&state.db.pool, circle_id, auth.account_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/circles/{circle_id}/children
///
/// Needs `create_subcircle` in the parent. The caller owns and joins the new circle.
async fn create_subcircle(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(parent_id): Path<CircleId>,
    Json(body): Json<CreateSubcircleRequest>,
) -> CirclesResult<(StatusCode, Json<CircleResponse>)> {
    validate_request(&body)?;
    let parent = require_circle(&state, parent_id).await?;

    let role_ids = roles::role_ids_of(&state.db.pool, auth.account_id, parent_id).await?;
    let allowed =
        permissions::effective_some(&state.db.pool, parent_id, &role_ids, &[CREATE_SUBCIRCLE.number]).await?;
    if !allowed.is_granted(CREATE_SUBCIRCLE.number) {
        return Err(CirclesError::MissingPermission {
            permission: CREATE_SUBCIRCLE.name.into(),
        });
    }

    let new_circle = NewCircle {
        parent_id: Some(parent_id),
        owner_id: auth.account_id,
        name: body.name,
        com_type: body
            .com_type
            .or(parent.default_subcircle_com_type)
            .unwrap_or(CommunicationType::Post),
        default_subcircle_com_type: None,
        default_subcircle_permissions: None,
    };
    let circle_id =
        provisioning::create_circle(&state.db.pool, &state.catalog, &new_circle, &[], &BTreeMap::new()).await?;
    members::add_member(&state.db.pool, circle_id, auth.account_id).await?;

    let circle = require_circle(&state, circle_id).await?;
    Ok((StatusCode::CREATED, Json(CircleResponse::from_circle(circle, &state.catalog))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use circles_common::permissions::{PermissionSet, SEND_CONTENT, VIEW_CIRCLE};
    use serde_json::{Value, json};

    async fn account_id(state: &AppState, session: &str) -> i64 {
        let (_, _, me) = send(state, "GET", "/api/accounts/@me", Some(session), None).await;
        me["id"].as_i64().unwrap()
    }

    /// A root where `::everyone` may create subcircles and view, and whose subcircles
    /// default to messages with `send_content` granted.
    async fn seeded_root(state: &AppState, owner: i64) -> CircleId {
        let defaults: PermissionSet = [(SEND_CONTENT.number, true)].into_iter().collect();
        let root = NewCircle {
            parent_id: None,
            owner_id: owner,
            name: "root".into(),
            com_type: CommunicationType::Post,
            default_subcircle_com_type: Some(CommunicationType::Message),
            default_subcircle_permissions: Some(defaults),
        };
        let everyone: PermissionSet = [(CREATE_SUBCIRCLE.number, true), (VIEW_CIRCLE.number, true)]
            .into_iter()
            .collect();
        let grants = BTreeMap::from([("::everyone".to_string(), everyone)]);
        provisioning::create_circle(&state.db.pool, &state.catalog, &root, &[], &grants)
            .await
            .unwrap()
    }

    #[test]
    fn permission_filter_parsing() {
        assert_eq!(requested_names("view_circle+SEND_CONTENT"), ["view_circle", "send_content"]);
        assert_eq!(requested_names(" view_circle  send_content "), ["view_circle", "send_content"]);
        assert!(requested_names("+ +").is_empty());
    }

    #[tokio::test]
    async fn hierarchy_reads() {
        let state = test_state().await;
        let alice = signup(&state, "alice").await;
        let root = seeded_root(&state, account_id(&state, &alice).await).await;

        let (status, _, roots) = send(&state, "GET", "/api/circles", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(roots.as_array().unwrap().len(), 1);
        assert_eq!(roots[0]["default_subcircle"]["com_type"], 1);

        let (status, _, _) = send(&state, "GET", &format!("/api/circles/{root}/parent"), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = send(&state, "GET", "/api/circles/999", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        send(&state, "POST", &format!("/api/circles/{root}/join"), Some(&alice), None).await;
        let (status, _, team) = send(
            &state,
            "POST",
            &format!("/api/circles/{root}/children"),
            Some(&alice),
            Some(json!({ "name": "team" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let team_id = team["id"].as_i64().unwrap();

        let (_, _, hierarchy) =
            send(&state, "GET", &format!("/api/circles/{team_id}/hierarchy"), None, None).await;
        assert_eq!(hierarchy["parents"][0]["id"], root);
        assert_eq!(hierarchy["children"], Value::Array(vec![]));

        let (_, _, children) = send(&state, "GET", &format!("/api/circles/{root}/children"), None, None).await;
        assert_eq!(children[0]["name"], "team");
    }

    #[tokio::test]
    async fn subcircle_creation_uses_parent_defaults() {
        let state = test_state().await;
        let alice = signup(&state, "alice").await;
        let alice_id = account_id(&state, &alice).await;
        let root = seeded_root(&state, alice_id).await;
        let uri = format!("/api/circles/{root}/children");

        // Not a member of root yet, so no roles and no permission.
        let (status, _, body) = send(&state, "POST", &uri, Some(&alice), Some(json!({ "name": "team" }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "MISSING_PERMISSION");

        let (status, _, _) = send(&state, "POST", &format!("/api/circles/{root}/join"), Some(&alice), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _, _) = send(&state, "POST", &format!("/api/circles/{root}/join"), Some(&alice), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _, team) = send(&state, "POST", &uri, Some(&alice), Some(json!({ "name": "team" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(team["owner_id"], alice_id);
        assert_eq!(team["com_type"], 1);
        let team_id = team["id"].as_i64().unwrap();

        let (status, _, body) = send(&state, "POST", &uri, Some(&alice), Some(json!({ "name": "team" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["existing_id"], team_id);

        // The creator joined, and the parent's default grants landed on the child's ::everyone.
        let (_, _, perms) = send(
            &state,
            "GET",
            &format!("/api/circles/{team_id}/roles/permissions?names=send_content+view_circle+delete_role"),
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(perms["send_content"]["granted"], true);
        assert_eq!(perms["view_circle"]["granted"], true);
        assert_eq!(perms["delete_role"]["granted"], false);
        assert_eq!(perms["delete_role"]["display_name"], "Delete Role");
        assert_eq!(perms.as_object().unwrap().len(), 3);

        let (_, _, roles) = send(&state, "GET", &format!("/api/circles/{team_id}/roles"), Some(&alice), None).await;
        assert_eq!(roles["::everyone"]["circle_id"], team_id);
        assert_eq!(roles["::everyone"]["order"], i32::MAX);
    }

    #[tokio::test]
    async fn permission_listing_is_deny_by_default() {
        let state = test_state().await;
        let alice = signup(&state, "alice").await;
        let root = seeded_root(&state, account_id(&state, &alice).await).await;
        let uri = format!("/api/circles/{root}/roles/permissions");

        let (status, _, perms) = send(&state, "GET", &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(perms.as_object().unwrap().len(), state.catalog.len());
        assert!(perms.as_object().unwrap().values().all(|p| p["granted"] == false));

        let (_, _, roles) = send(&state, "GET", &format!("/api/circles/{root}/roles"), Some(&alice), None).await;
        assert_eq!(roles, json!({}));

        let (status, _, body) = send(&state, "GET", &format!("{uri}?names=fly"), Some(&alice), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["message"], "Validation failed: Bad permission name fly");

        let (status, _, _) = send(&state, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

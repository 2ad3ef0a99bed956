//! Account routes: profile lookup and profile editing.

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    middleware,
    routing::get,
};
use circles_common::{
    error::{CirclesError, CirclesResult},
    models::account::{AccountResponse, UpdateAccountRequest},
    validation::{clean_bio, validate_request},
};
use circles_db::{
    repository::accounts::{self, AccountChanges},
    sqlite::is_unique_violation,
};
use std::sync::Arc;

use crate::{
    AppState,
    middleware::{AuthContext, session_middleware},
};

pub fn router(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/accounts/@me", get(get_me).patch(update_me))
        .route("/accounts/{username}", get(get_account))
        .route_layer(middleware::from_fn_with_state(state.clone(), session_middleware))
}

fn username_taken() -> CirclesError {
    CirclesError::AlreadyExists {
        resource: "Username".into(),
    }
}

/// GET /api/accounts/@me
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> CirclesResult<Json<AccountResponse>> {
    let account = accounts::find_by_id(&state.db.pool, auth.account_id)
        .await?
        .ok_or_else(|| CirclesError::not_found("Account"))?;
    Ok(Json(AccountResponse::new(account, Some(auth.account_id))))
}

/// GET /api/accounts/{username}
async fn get_account(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(username): Path<String>,
) -> CirclesResult<Json<AccountResponse>> {
    let account = accounts::find_by_username(&state.db.pool, &username)
        .await?
        .ok_or_else(|| CirclesError::not_found("Account"))?;
    Ok(Json(AccountResponse::new(account, Some(auth.account_id))))
}

/// PATCH /api/accounts/@me
///
/// Absent fields stay as they are. An empty display name removes it; the bio is normalized
/// before its length is checked.
async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<UpdateAccountRequest>,
) -> CirclesResult<Json<AccountResponse>> {
    validate_request(&body)?;

    if let Some(ref username) = body.username {
        if let Some(existing) = accounts::find_by_username(&state.db.pool, username).await? {
            if existing.id != auth.account_id {
                return Err(username_taken());
            }
        }
    }

    let bio = body.bio.as_deref().map(clean_bio).transpose()?;
    let changes = AccountChanges {
        username: body.username.as_deref(),
        display_name: body
            .display_name
            .as_deref()
            .map(|name| Some(name).filter(|name| !name.is_empty())),
        bio: bio.as_deref(),
    };

    let account = accounts::update_account(&state.db.pool, auth.account_id, &changes)
        .await
        .map_err(|e| if is_unique_violation(&e) { username_taken() } else { e.into() })?
        .ok_or_else(|| CirclesError::not_found("Account"))?;

    tracing::debug!(account_id = account.id, "Account updated");
    Ok(Json(AccountResponse::new(account, Some(auth.account_id))))
}

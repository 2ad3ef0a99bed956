//! Authentication routes: signup, login, logout.
//!
//! A successful signup or login answers with the account and sets the session cookie.

use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    routing::post,
};
use axum_extra::extract::cookie::CookieJar;
use circles_common::{
    error::{CirclesError, CirclesResult},
    models::account::{Account, AccountResponse, LoginRequest, SignupRequest},
    validation::validate_request,
};
use circles_db::{
    repository::{accounts, sessions},
    sqlite::is_unique_violation,
};
use std::sync::Arc;

use crate::{
    AppState,
    auth,
    middleware::{AuthContext, session_middleware},
};

/// Auth router.
pub fn router(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    let public = Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login));

    let authed = Router::new()
        .route("/logout", post(logout))
        .route_layer(middleware::from_fn_with_state(state.clone(), session_middleware));

    public.merge(authed)
}

fn username_taken() -> CirclesError {
    CirclesError::AlreadyExists {
        resource: "Username".into(),
    }
}

/// Start a fresh session for `account` and add its cookie to the jar.
async fn start_session(state: &AppState, jar: CookieJar, account: &Account) -> CirclesResult<CookieJar> {
    let session_id = auth::new_session_id();
    sessions::create_login(&state.db.pool, &session_id, account.id).await?;
    Ok(jar.add(auth::session_cookie(&state.sessions, session_id)))
}

/// POST /api/signup
async fn signup(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<SignupRequest>,
) -> CirclesResult<(StatusCode, CookieJar, Json<AccountResponse>)> {
    validate_request(&body)?;

    if accounts::find_by_username(&state.db.pool, &body.username)
        .await?
        .is_some()
    {
        return Err(username_taken());
    }

    let password_hash =
        auth::hash_password(&body.password).map_err(|e| CirclesError::Internal(anyhow::anyhow!("{e}")))?;

    let account = accounts::create_account(&state.db.pool, &body.username, &password_hash)
        .await
        .map_err(|e| if is_unique_violation(&e) { username_taken() } else { e.into() })?;

    let jar = start_session(&state, jar, &account).await?;

    tracing::info!(account_id = account.id, username = %account.username, "New account registered");

    let viewer = Some(account.id);
    Ok((StatusCode::CREATED, jar, Json(AccountResponse::new(account, viewer))))
}

/// POST /api/login
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> CirclesResult<(CookieJar, Json<AccountResponse>)> {
    validate_request(&body)?;

    let account = accounts::find_by_username(&state.db.pool, &body.username)
        .await?
        .ok_or(CirclesError::InvalidCredentials)?;

    let valid = auth::verify_password(&body.password, &account.password_hash)
        .map_err(|_| CirclesError::InvalidCredentials)?;
    if !valid {
        return Err(CirclesError::InvalidCredentials);
    }

    let jar = start_session(&state, jar, &account).await?;
    tracing::info!(account_id = account.id, "Account logged in");

    let viewer = Some(account.id);
    Ok((jar, Json(AccountResponse::new(account, viewer))))
}

/// POST /api/logout
async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(auth_ctx): Extension<AuthContext>,
    jar: CookieJar,
) -> CirclesResult<(StatusCode, CookieJar)> {
    sessions::delete_login(&state.db.pool, &auth_ctx.session_id).await?;
    tracing::info!(account_id = auth_ctx.account_id, "Account logged out");
    Ok((StatusCode::NO_CONTENT, jar.remove(auth::removal_cookie(&state.sessions))))
}

//! Request middleware: session resolution and response hardening headers.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use circles_common::{error::CirclesError, models::circle::AccountId};
use circles_db::repository::sessions;

use crate::AppState;

/// The logged-in account behind the current request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account_id: AccountId,
    pub session_id: String,
}

/// Resolve the session cookie to an [`AuthContext`] and store it in the request extensions.
///
/// A missing cookie, an unknown session id or an expired login all yield
/// [`CirclesError::Unauthorized`]. Expired logins are deleted on sight.
pub async fn session_middleware(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, CirclesError> {
    let session_id = jar
        .get(&state.sessions.cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(CirclesError::Unauthorized)?;

    let login = sessions::find_login(&state.db.pool, &session_id)
        .await?
        .ok_or(CirclesError::Unauthorized)?;

    if login.is_expired(state.sessions.ttl_secs, Utc::now()) {
        sessions::delete_login(&state.db.pool, &session_id).await?;
        tracing::debug!(account_id = login.account_id, "Session expired");
        return Err(CirclesError::Unauthorized);
    }

    request.extensions_mut().insert(AuthContext {
        account_id: login.account_id,
        session_id,
    });

    Ok(next.run(request).await)
}

/// Attach the standard hardening headers to every response.
///
/// Responses are JSON only, so the content security policy allows nothing to load.
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let h = response.headers_mut();

    macro_rules! set {
        ($name:expr, $val:expr) => {
            if let Ok(v) = $val.parse::<HeaderValue>() {
                h.insert($name, v);
            }
        };
    }

    set!(HeaderName::from_static("x-content-type-options"), "nosniff");
    set!(HeaderName::from_static("x-frame-options"), "DENY");
    set!(HeaderName::from_static("referrer-policy"), "strict-origin-when-cross-origin");
    set!(HeaderName::from_static("strict-transport-security"), "max-age=63072000; includeSubDomains; preload");
    set!(HeaderName::from_static("content-security-policy"), "default-src 'none'; frame-ancestors 'none'");

    response
}


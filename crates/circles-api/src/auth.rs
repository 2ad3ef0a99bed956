//! Authentication: Argon2id password hashes and cookie-carried session ids.
//!
//! A session id is an opaque random UUID. The `logins` table maps it to an account; the
//! browser only ever sees the id.

use argon2::Argon2;
use axum_extra::extract::cookie::{Cookie, SameSite};
use circles_common::config::SessionConfig;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng};
use uuid::Uuid;

/// Hash a password using Argon2id.
pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against an Argon2id hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// HttpOnly cookie carrying `session_id`.
pub fn session_cookie(config: &SessionConfig, session_id: String) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Cookie that clears the session cookie on the client.
pub fn removal_cookie(config: &SessionConfig) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), "")).path("/").build()
}

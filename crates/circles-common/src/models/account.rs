//! Account model: the identity layer.
//!
//! Accounts are a username and a password. Display name, picture and bio are optional
//! profile decoration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::circle::AccountId;
use crate::validation::{USERNAME_REGEX, validate_display_name};

/// Picture assigned to new accounts.
pub const DEFAULT_PFP: &str = "default_pfp.png";

/// A stored account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,

    /// Unique username, compared case-insensitively
    pub username: String,

    /// Display name (2-32 chars when set)
    pub display_name: Option<String>,

    /// Profile picture file name
    pub pfp: String,

    /// Normalized bio (up to 400 chars)
    pub bio: String,

    /// Argon2id password hash
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub created: DateTime<Utc>,
}

/// Registration request.
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 2, max = 32, message = "Username must be 2-32 characters"))]
    #[validate(regex(
        path = *USERNAME_REGEX,
        message = "Username can only contain letters and numbers separated by single '-', '_' or '.'"
    ))]
    pub username: String,

    #[validate(length(min = 8, max = 64, message = "Password must be 8-64 characters"))]
    pub password: String,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 32))]
    pub username: String,

    #[validate(length(min = 1, max = 64))]
    pub password: String,
}

/// Profile edit. Absent fields are left unchanged; an empty display name clears it.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateAccountRequest {
    #[validate(length(min = 2, max = 32, message = "Username must be 2-32 characters"))]
    #[validate(regex(path = *USERNAME_REGEX, message = "Invalid username"))]
    pub username: Option<String>,

    #[validate(custom(function = "validate_display_name"))]
    pub display_name: Option<String>,

    /// Normalized before its length is checked
    pub bio: Option<String>,
}

/// Safe account representation for API responses (no sensitive fields)
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: AccountId,
    pub username: String,
    pub display_name: Option<String>,
    pub pfp: String,
    pub bio: String,
    pub created: DateTime<Utc>,
    /// Whether this is the requesting account
    pub is_mine: bool,
}

impl AccountResponse {
    pub fn new(a: Account, viewer: Option<AccountId>) -> Self {
        Self {
            is_mine: viewer == Some(a.id),
            id: a.id,
            username: a.username,
            display_name: a.display_name,
            pfp: a.pfp,
            bio: a.bio,
            created: a.created,
        }
    }
}

//! Input validation utilities.
//!
//! Centralized validation helpers used across API routes.

use std::sync::LazyLock;

use validator::{Validate, ValidationError};

use crate::error::CirclesError;

/// Letters and digits, optionally split by single `-`, `_` or `.` separators.
pub static USERNAME_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)^[a-z0-9]+([-_.][a-z0-9]+)*$").expect("username pattern compiles")
});

pub const MAX_BIO_LEN: usize = 400;

/// Validate a request body, returning a CirclesError::Validation on failure.
pub fn validate_request<T: Validate>(body: &T) -> Result<(), CirclesError> {
    body.validate().map_err(|e| CirclesError::Validation {
        message: format_validation_errors(e),
    })
}

/// Format validation errors into a human-readable string.
fn format_validation_errors(errors: validator::ValidationErrors) -> String {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for '{field}'"))
            })
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Display names are either empty (cleared) or 2-32 characters.
pub fn validate_display_name(display_name: &str) -> Result<(), ValidationError> {
    match display_name.chars().count() {
        0 | 2..=32 => Ok(()),
        _ => Err(ValidationError::new("display_name")
            .with_message("Display name must be empty or 2-32 characters".into())),
    }
}

/// Trim a bio, strip carriage returns and collapse runs of newlines into one.
pub fn normalize_bio(bio: &str) -> String {
    let mut normalized = String::with_capacity(bio.len());
    let mut last_was_newline = false;
    for c in bio.trim().chars().filter(|c| *c != '\r') {
        if c == '\n' {
            if last_was_newline {
                continue;
            }
            last_was_newline = true;
        } else {
            last_was_newline = false;
        }
        normalized.push(c);
    }
    // A stripped `\r` can leave a newline at the very end.
    while normalized.ends_with('\n') {
        normalized.pop();
    }
    normalized
}

/// Normalize a bio and check it against [`MAX_BIO_LEN`].
pub fn clean_bio(bio: &str) -> Result<String, CirclesError> {
    let bio = normalize_bio(bio);
    if bio.chars().count() > MAX_BIO_LEN {
        return Err(CirclesError::Validation {
            message: format!("Bio must be at most {MAX_BIO_LEN} characters"),
        });
    }
    Ok(bio)
}

//! Centralized error types for Circles.
//!
//! Uses `thiserror` for ergonomic error definitions and provides HTTP-friendly
//! error variants that can be directly converted to API responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::codec::CodecError;
use crate::permissions::CatalogError;

/// Core application error type used across all Circles crates.
#[derive(Debug, thiserror::Error)]
pub enum CirclesError {
    // === Auth errors ===
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthorized")]
    Unauthorized,

    // === Resource errors ===
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("{resource} already exists")]
    AlreadyExists { resource: String },

    #[error("Duplicate circle name {name} {}", parent_label(.parent_id))]
    DuplicateCircleName {
        existing_id: i64,
        parent_id: Option<i64>,
        name: String,
    },

    #[error("Duplicate role name {name}")]
    DuplicateRoleName { name: String },

    // === Validation errors ===
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // === Permission errors ===
    #[error("Missing permission: {permission}")]
    MissingPermission { permission: String },

    // === Provisioning errors ===
    #[error("Invalid circle configuration: {message}")]
    Configuration { message: String },

    #[error("Provisioning circle {circle} failed: {source}")]
    Provisioning {
        circle: String,
        #[source]
        source: Box<CirclesError>,
    },

    // === Infrastructure errors ===
    #[error("Malformed permission encoding: {0}")]
    MalformedEncoding(#[from] CodecError),

    #[error("Permission catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn parent_label(parent_id: &Option<i64>) -> String {
    match parent_id {
        Some(parent) => format!("in parent circle {parent}"),
        None => "at root".to_string(),
    }
}

/// JSON error response body sent to clients.
#[derive(Serialize)]
struct ErrorResponse {
    code: u16,
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    existing_id: Option<i64>,
}

impl CirclesError {
    /// Shorthand for [`CirclesError::NotFound`].
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Shorthand for [`CirclesError::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Map error to HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::AlreadyExists { .. }
            | Self::DuplicateCircleName { .. }
            | Self::DuplicateRoleName { .. } => StatusCode::CONFLICT,
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::MissingPermission { .. } => StatusCode::FORBIDDEN,
            Self::Provisioning { source, .. } => source.status_code(),
            Self::Configuration { .. }
            | Self::MalformedEncoding(_)
            | Self::Catalog(_)
            | Self::Database(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error code string for programmatic handling by clients.
    pub fn error_code(&self) -> &str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::DuplicateCircleName { .. } => "DUPLICATE_CIRCLE_NAME",
            Self::DuplicateRoleName { .. } => "DUPLICATE_ROLE_NAME",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::MissingPermission { .. } => "MISSING_PERMISSION",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Provisioning { source, .. } => source.error_code(),
            Self::MalformedEncoding(_) => "MALFORMED_ENCODING",
            Self::Catalog(_) => "CATALOG_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The conflicting circle id carried by a duplicate-name condition.
    pub fn existing_circle_id(&self) -> Option<i64> {
        match self {
            Self::DuplicateCircleName { existing_id, .. } => Some(*existing_id),
            Self::Provisioning { source, .. } => source.existing_circle_id(),
            _ => None,
        }
    }
}

impl IntoResponse for CirclesError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't leak internal details to clients
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            code: status.as_u16(),
            error: self.error_code().to_string(),
            message,
            existing_id: self.existing_circle_id(),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Convenience type alias for Results using CirclesError.
pub type CirclesResult<T> = Result<T, CirclesError>;

//! Circle model: the nested community container.
//!
//! Circles form a forest through `parent_id`. A circle may carry defaults that are handed
//! down to subcircles created beneath it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CirclesError;
use crate::permissions::{PermissionCatalog, PermissionSet, PermissionState, describe};

pub type CircleId = i64;
pub type AccountId = i64;

/// How content is presented inside a circle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i32)]
#[serde(try_from = "i64", into = "i64")]
pub enum CommunicationType {
    /// Threaded posts
    Post = 0,
    /// Chat-style messages
    Message = 1,
}

impl TryFrom<i64> for CommunicationType {
    type Error = CirclesError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Post),
            1 => Ok(Self::Message),
            other => Err(CirclesError::Validation {
                message: format!("Unknown communication type {other}"),
            }),
        }
    }
}

impl From<CommunicationType> for i64 {
    fn from(value: CommunicationType) -> Self {
        value as i64
    }
}

/// A stored circle.
#[derive(Debug, Clone, PartialEq)]
pub struct Circle {
    pub id: CircleId,
    pub parent_id: Option<CircleId>,
    pub owner_id: AccountId,
    pub name: String,
    pub created: DateTime<Utc>,
    pub com_type: CommunicationType,
    pub default_subcircle_com_type: Option<CommunicationType>,
    /// `None` when unset or stored as an empty set.
    pub default_subcircle_permissions: Option<PermissionSet>,
}

/// Attributes of a circle that does not exist yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCircle {
    pub parent_id: Option<CircleId>,
    pub owner_id: AccountId,
    pub name: String,
    pub com_type: CommunicationType,
    pub default_subcircle_com_type: Option<CommunicationType>,
    pub default_subcircle_permissions: Option<PermissionSet>,
}

#[derive(Debug, Serialize)]
pub struct DefaultSubcircleResponse {
    pub com_type: Option<CommunicationType>,
    pub permissions: BTreeMap<&'static str, PermissionState>,
}

#[derive(Debug, Serialize)]
pub struct CircleResponse {
    pub id: CircleId,
    pub parent_id: Option<CircleId>,
    pub owner_id: AccountId,
    pub name: String,
    pub created: DateTime<Utc>,
    pub com_type: CommunicationType,
    pub default_subcircle: DefaultSubcircleResponse,
}

impl CircleResponse {
    /// Permission numbers are rendered by name, so the catalog is needed alongside the circle.
    pub fn from_circle(circle: Circle, catalog: &PermissionCatalog) -> Self {
        let permissions = circle
            .default_subcircle_permissions
            .as_ref()
            .map(|set| describe(catalog, set))
            .unwrap_or_default();

        Self {
            id: circle.id,
            parent_id: circle.parent_id,
            owner_id: circle.owner_id,
            name: circle.name,
            created: circle.created,
            com_type: circle.com_type,
            default_subcircle: DefaultSubcircleResponse {
                com_type: circle.default_subcircle_com_type,
                permissions,
            },
        }
    }
}

/// Ancestors (nearest first) and direct children of a circle.
#[derive(Debug, Serialize)]
pub struct HierarchyResponse {
    pub parents: Vec<CircleResponse>,
    pub children: Vec<CircleResponse>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubcircleRequest {
    #[validate(length(min = 1, max = 100, message = "Circle name must be 1-100 characters"))]
    pub name: String,

    /// Falls back to the parent's default subcircle type, then [`CommunicationType::Post`].
    pub com_type: Option<CommunicationType>,
}

//! Role model.
//!
//! Roles belong to one circle and are ordered by `priority_order` (lower wins).
//! Every circle has an `::everyone` role that all members hold.

use serde::{Serialize, Serializer};

use super::circle::CircleId;
use crate::error::CirclesError;

pub type RoleId = i64;

/// Name of the role every member of a circle holds.
pub const EVERYONE_ROLE_NAME: &str = "::everyone";

/// Priority given to roles without an explicit order, `::everyone` included.
pub const LOWEST_PRIORITY: i32 = i32::MAX;

/// 3-byte RGB role color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoleColor(pub [u8; 3]);

impl RoleColor {
    pub const DEFAULT: RoleColor = RoleColor([0x7f, 0x7f, 0x7f]);

    /// Parse `rrggbb` (an optional leading `#` is accepted).
    pub fn from_hex(value: &str) -> Result<Self, CirclesError> {
        let digits = value.strip_prefix('#').unwrap_or(value);
        let mut rgb = [0u8; 3];
        hex::decode_to_slice(digits, &mut rgb).map_err(|_| CirclesError::Validation {
            message: format!("Invalid role color {value:?}"),
        })?;
        Ok(Self(rgb))
    }

    /// Read a stored color, falling back to [`RoleColor::DEFAULT`] when missing or malformed.
    pub fn from_stored(bytes: Option<&[u8]>) -> Self {
        bytes
            .and_then(|b| <[u8; 3]>::try_from(b).ok())
            .map(Self)
            .unwrap_or(Self::DEFAULT)
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl Serialize for RoleColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// A stored role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub circle_id: CircleId,
    pub priority_order: i32,
    pub name: String,
    /// `None` when the row has no color; rendered as [`RoleColor::DEFAULT`].
    pub color: Option<RoleColor>,
}

/// A role to be created or reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRole {
    pub name: String,
    pub order: i32,
    pub color: Option<RoleColor>,
}

impl NewRole {
    /// The synthesized `::everyone` role.
    pub fn everyone() -> Self {
        Self {
            name: EVERYONE_ROLE_NAME.to_string(),
            order: LOWEST_PRIORITY,
            color: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub circle_id: CircleId,
    pub order: i32,
    pub name: String,
    pub color: RoleColor,
}

impl From<Role> for RoleResponse {
    fn from(r: Role) -> Self {
        Self {
            circle_id: r.circle_id,
            order: r.priority_order,
            name: r.name,
            color: r.color.unwrap_or(RoleColor::DEFAULT),
        }
    }
}

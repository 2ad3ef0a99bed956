//! Declarative circle definitions (`circles_init.json`).
//!
//! The document is an object of circle name to definition, applied in document order:
//!
//! ```json
//! {
//!   "root": {
//!     "owner_id": "1",
//!     "com_type": 0,
//!     "default_subcircle": { "com_type": 1, "permissions": { "view_circle": true } },
//!     "roles": { "admin": { "color": "ff0000", "order": 0 } },
//!     "permissions": { "admin": { "create_subcircle": true } }
//!   }
//! }
//! ```
//!
//! The whole document is validated before anything is written: an unknown permission,
//! an unparseable id, a bad color or a non-boolean grant rejects the run.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{CirclesError, CirclesResult};
use crate::models::circle::{CircleId, CommunicationType, NewCircle};
use crate::models::role::{LOWEST_PRIORITY, NewRole, RoleColor};
use crate::permissions::{PermissionCatalog, PermissionSet};

/// One fully parsed circle definition.
#[derive(Debug, Clone, PartialEq)]
pub struct CircleSpec {
    pub circle: NewCircle,
    /// Roles in document order. `::everyone` is only present when listed explicitly.
    pub roles: Vec<NewRole>,
    /// Grants keyed by role name. The role may belong to an ancestor circle.
    pub permissions: BTreeMap<String, PermissionSet>,
}

impl CircleSpec {
    pub fn name(&self) -> &str {
        &self.circle.name
    }
}

/// Ids are written as strings in the file; bare integers are accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn parse(self, field: &str) -> CirclesResult<i64> {
        match self {
            RawId::Number(id) => Ok(id),
            RawId::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| CirclesError::configuration(format!("{field} {text:?} is not an integer"))),
        }
    }
}

#[derive(Deserialize)]
struct RawCircle {
    parent_id: Option<RawId>,
    owner_id: RawId,
    #[serde(alias = "communication_type")]
    com_type: i64,
    default_subcircle: Option<RawDefaultSubcircle>,
    #[serde(default)]
    roles: Map<String, Value>,
    #[serde(default)]
    permissions: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawDefaultSubcircle {
    #[serde(alias = "communication_type")]
    com_type: Option<i64>,
    permissions: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct RawRole {
    color: Option<String>,
    order: Option<i32>,
}

/// Read and parse a definition file.
pub fn load(path: &Path, catalog: &PermissionCatalog) -> CirclesResult<Vec<CircleSpec>> {
    let json = std::fs::read_to_string(path).map_err(|e| {
        CirclesError::configuration(format!("Cannot read {}: {e}", path.display()))
    })?;
    parse(&json, catalog)
}

/// Parse a definition document. Entries keep their document order.
pub fn parse(json: &str, catalog: &PermissionCatalog) -> CirclesResult<Vec<CircleSpec>> {
    let document: Map<String, Value> = serde_json::from_str(json)
        .map_err(|e| CirclesError::configuration(format!("Malformed circle definitions: {e}")))?;

    document
        .into_iter()
        .map(|(name, value)| {
            parse_entry(&name, value, catalog).map_err(|source| CirclesError::Provisioning {
                circle: name,
                source: Box::new(source),
            })
        })
        .collect()
}

fn parse_entry(name: &str, value: Value, catalog: &PermissionCatalog) -> CirclesResult<CircleSpec> {
    let raw: RawCircle = serde_json::from_value(value)
        .map_err(|e| CirclesError::configuration(format!("Malformed circle definition: {e}")))?;

    let parent_id: Option<CircleId> = raw.parent_id.map(|id| id.parse("parent_id")).transpose()?;
    let owner_id = raw.owner_id.parse("owner_id")?;
    let com_type = communication_type(raw.com_type)?;

    let (default_subcircle_com_type, default_subcircle_permissions) = match raw.default_subcircle {
        Some(defaults) => (
            defaults.com_type.map(communication_type).transpose()?,
            defaults
                .permissions
                .map(|grants| permission_set(catalog, grants))
                .transpose()?
                .filter(|set| !set.is_empty()),
        ),
        None => (None, None),
    };

    let roles = raw
        .roles
        .into_iter()
        .map(|(role_name, value)| {
            let role: RawRole = serde_json::from_value(value).map_err(|e| {
                CirclesError::configuration(format!("Malformed role {role_name}: {e}"))
            })?;
            Ok(NewRole {
                color: role.color.as_deref().map(RoleColor::from_hex).transpose().map_err(|_| {
                    CirclesError::configuration(format!("Role {role_name} has an invalid color"))
                })?,
                order: role.order.unwrap_or(LOWEST_PRIORITY),
                name: role_name,
            })
        })
        .collect::<CirclesResult<Vec<_>>>()?;

    let permissions = raw
        .permissions
        .into_iter()
        .map(|(role_name, value)| match value {
            Value::Object(grants) => Ok((role_name, permission_set(catalog, grants)?)),
            _ => Err(CirclesError::configuration(format!(
                "Permissions of role {role_name} must be an object"
            ))),
        })
        .collect::<CirclesResult<BTreeMap<_, _>>>()?;

    Ok(CircleSpec {
        circle: NewCircle {
            parent_id,
            owner_id,
            name: name.to_string(),
            com_type,
            default_subcircle_com_type,
            default_subcircle_permissions,
        },
        roles,
        permissions,
    })
}

fn communication_type(value: i64) -> CirclesResult<CommunicationType> {
    CommunicationType::try_from(value)
        .map_err(|_| CirclesError::configuration(format!("Unknown communication type {value}")))
}

fn permission_set(catalog: &PermissionCatalog, grants: Map<String, Value>) -> CirclesResult<PermissionSet> {
    grants
        .into_iter()
        .map(|(permission_name, value)| {
            let permission = catalog.by_name(&permission_name).ok_or_else(|| {
                CirclesError::configuration(format!("Unknown permission {permission_name}"))
            })?;
            let granted = value.as_bool().ok_or_else(|| {
                CirclesError::configuration(format!("Grant for {permission_name} must be a boolean"))
            })?;
            Ok((permission.number, granted))
        })
        .collect()
}

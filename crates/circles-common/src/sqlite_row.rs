//! Manual `sqlx::FromRow<'_, SqliteRow>` implementations for the stored models.
//!
//! Circles keep their default subcircle permissions as an encoded blob and roles keep
//! their color as raw bytes, so these rows need decoding beyond what the derive offers.

use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::codec;
use crate::models::{
    account::Account,
    circle::{Circle, CommunicationType},
    role::{Role, RoleColor},
};

fn com_type(row: &SqliteRow, col: &str) -> Result<Option<CommunicationType>, sqlx::Error> {
    let raw: Option<i64> = row.try_get(col)?;
    raw.map(|v| CommunicationType::try_from(v).map_err(|e| sqlx::Error::Decode(Box::new(e))))
        .transpose()
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for Circle {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let blob: Option<Vec<u8>> = row.try_get("default_subcircle_permissions")?;
        let default_subcircle_permissions = codec::decode_optional(blob.as_deref())
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(Circle {
            id: row.try_get("id")?,
            parent_id: row.try_get("parent_id")?,
            owner_id: row.try_get("owner_id")?,
            name: row.try_get("name")?,
            created: row.try_get("created")?,
            com_type: com_type(row, "com_type")?
                .ok_or_else(|| sqlx::Error::Decode("circle without communication type".into()))?,
            default_subcircle_com_type: com_type(row, "default_subcircle_com_type")?,
            default_subcircle_permissions,
        })
    }
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for Role {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let color: Option<Vec<u8>> = row.try_get("color")?;
        Ok(Role {
            id: row.try_get("id")?,
            circle_id: row.try_get("circle_id")?,
            priority_order: row.try_get("priority_order")?,
            name: row.try_get("name")?,
            color: color.map(|bytes| RoleColor::from_stored(Some(&bytes))),
        })
    }
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for Account {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Account {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            display_name: row.try_get("display_name")?,
            pfp: row.try_get("pfp")?,
            bio: row.try_get("bio")?,
            password_hash: row.try_get("password_hash")?,
            created: row.try_get("created")?,
        })
    }
}

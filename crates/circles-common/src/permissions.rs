//! Permission system: named flags with stable numbers, resolved per circle.
//!
//! Every permission has a fixed number that is what gets stored in `role_permissions`
//! and in encoded permission sets. The [`PermissionCatalog`] is built once at startup and
//! handed to whoever needs to translate between names and numbers.
//!
//! A [`PermissionSet`] is sparse: a permission that was never set is [`Grant::Unset`],
//! which is different from an explicit [`Grant::Denied`]. An explicit deny in a nearer
//! circle hides an ancestor's grant, while an unset entry lets it show through.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

/// Stable numeric identifier of a permission.
pub type PermissionNumber = i64;

/// A named permission flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Permission {
    pub number: PermissionNumber,
    pub name: &'static str,
    pub display_name: &'static str,
}

impl Permission {
    pub const fn new(number: PermissionNumber, name: &'static str, display_name: &'static str) -> Self {
        Self {
            number,
            name,
            display_name,
        }
    }
}

// === Circle management ===
pub const VIEW_CIRCLE: Permission = Permission::new(1, "view_circle", "View Circle");
pub const CHANGE_CIRCLE_NAME: Permission =
    Permission::new(2, "change_circle_name", "Change Circle Name");
pub const CREATE_SUBCIRCLE: Permission = Permission::new(3, "create_subcircle", "Create Subcircle");
pub const DELETE_SUBCIRCLE: Permission = Permission::new(4, "delete_subcircle", "Delete Subcircle");

// === Markdown ===
pub const ALLOW_MARKDOWN_HEADERS: Permission =
    Permission::new(5, "allow_markdown_headers", "Allow Markdown Headers");
pub const ALLOW_MARKDOWN_LINKS: Permission =
    Permission::new(6, "allow_markdown_links", "Allow Markdown Links");
pub const ALLOW_MARKDOWN_LISTS: Permission =
    Permission::new(7, "allow_markdown_lists", "Allow Markdown Lists");
pub const ALLOW_MARKDOWN_CODE: Permission =
    Permission::new(8, "allow_markdown_code", "Allow Markdown Code");
pub const ALLOW_MARKDOWN_CODE_BLOCK: Permission =
    Permission::new(9, "allow_markdown_code_block", "Allow Markdown Code Block");
pub const ALLOW_MARKDOWN_BOLD: Permission =
    Permission::new(10, "allow_markdown_bold", "Allow Markdown Bold");
pub const ALLOW_MARKDOWN_ITALIC: Permission =
    Permission::new(11, "allow_markdown_italic", "Allow Markdown Italic");
pub const ALLOW_MARKDOWN_UNDERSCORE: Permission =
    Permission::new(12, "allow_markdown_underscore", "Allow Markdown Underscore");
pub const ALLOW_MARKDOWN_STRIKETHROUGH: Permission =
    Permission::new(13, "allow_markdown_strikethrough", "Allow Markdown Strikethrough");
pub const ALLOW_MARKDOWN_SPOILER: Permission =
    Permission::new(14, "allow_markdown_spoiler", "Allow Markdown Spoiler");

// === Content ===
pub const SEND_CONTENT: Permission = Permission::new(15, "send_content", "Send Content");
pub const DELETE_CONTENT: Permission = Permission::new(16, "delete_content", "Delete Content");
pub const DELETE_OWN_CONTENT: Permission =
    Permission::new(17, "delete_own_content", "Delete Own Content");
pub const EDIT_OWN_CONTENT: Permission = Permission::new(18, "edit_own_content", "Edit Own Content");
pub const REACT_CONTENT_NEW: Permission =
    Permission::new(19, "react_content_new", "Add New Reactions to Content");
pub const REACT_CONTENT_ADD: Permission =
    Permission::new(20, "react_content_add", "Add Reactions to Content");
pub const SEND_ATTACHMENTS: Permission = Permission::new(21, "send_attachments", "Send Attachments");
pub const SEND_EMBEDS: Permission =
    Permission::new(22, "send_embeds", "Send Links that Embed Content");

// === Subcircle defaults ===
pub const EDIT_DEFAULT_SUBCIRCLE_COM_TYPE: Permission = Permission::new(
    23,
    "edit_default_subcircle_communication_type",
    "Edit Default Subcircle Communication Type",
);
pub const EDIT_DEFAULT_SUBCIRCLE_PERMISSIONS: Permission = Permission::new(
    24,
    "edit_default_subcircle_permissions",
    "Edit Default Subcircle Permissions",
);

// === Roles ===
pub const ADD_ROLE: Permission = Permission::new(25, "add_role", "Add Role");
pub const DELETE_ROLE: Permission = Permission::new(26, "delete_role", "Delete Role");
pub const EDIT_ROLE_PERMISSIONS: Permission =
    Permission::new(27, "edit_role_permissions", "Edit Role Permissions");
pub const EDIT_ROLE_NAME: Permission = Permission::new(28, "edit_role_name", "Edit Role Name");
pub const EDIT_ROLE_COLOR: Permission = Permission::new(29, "edit_role_color", "Edit Role Color");
pub const EDIT_ROLE_MEMBERS: Permission =
    Permission::new(30, "edit_role_members", "Edit Role Members");

// === Members ===
pub const INVITE_CIRCLE_MEMBERS: Permission =
    Permission::new(31, "invite_circle_members", "Invite Circle Members");
pub const REMOVE_CIRCLE_MEMBERS: Permission =
    Permission::new(32, "remove_circle_members", "Remove Circle Members");
pub const BAN_CIRCLE_MEMBERS: Permission =
    Permission::new(33, "ban_circle_members", "Ban Circle Members");
pub const MUTE_CIRCLE_MEMBERS: Permission =
    Permission::new(34, "mute_circle_members", "Mute Circle Members");
pub const MENTION_EVERYONE: Permission =
    Permission::new(35, "mention_everyone", "Mention @everyone");

/// Every built-in permission, in number order.
pub const BUILTIN: [Permission; 35] = [
    VIEW_CIRCLE,
    CHANGE_CIRCLE_NAME,
    CREATE_SUBCIRCLE,
    DELETE_SUBCIRCLE,
    ALLOW_MARKDOWN_HEADERS,
    ALLOW_MARKDOWN_LINKS,
    ALLOW_MARKDOWN_LISTS,
    ALLOW_MARKDOWN_CODE,
    ALLOW_MARKDOWN_CODE_BLOCK,
    ALLOW_MARKDOWN_BOLD,
    ALLOW_MARKDOWN_ITALIC,
    ALLOW_MARKDOWN_UNDERSCORE,
    ALLOW_MARKDOWN_STRIKETHROUGH,
    ALLOW_MARKDOWN_SPOILER,
    SEND_CONTENT,
    DELETE_CONTENT,
    DELETE_OWN_CONTENT,
    EDIT_OWN_CONTENT,
    REACT_CONTENT_NEW,
    REACT_CONTENT_ADD,
    SEND_ATTACHMENTS,
    SEND_EMBEDS,
    EDIT_DEFAULT_SUBCIRCLE_COM_TYPE,
    EDIT_DEFAULT_SUBCIRCLE_PERMISSIONS,
    ADD_ROLE,
    DELETE_ROLE,
    EDIT_ROLE_PERMISSIONS,
    EDIT_ROLE_NAME,
    EDIT_ROLE_COLOR,
    EDIT_ROLE_MEMBERS,
    INVITE_CIRCLE_MEMBERS,
    REMOVE_CIRCLE_MEMBERS,
    BAN_CIRCLE_MEMBERS,
    MUTE_CIRCLE_MEMBERS,
    MENTION_EVERYONE,
];

/// Problems found while building a [`PermissionCatalog`].
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("permission {name} has no number assigned")]
    UnassignedNumber { name: &'static str },

    #[error("permission number {number} is used by both {first} and {second}")]
    DuplicateNumber {
        number: PermissionNumber,
        first: &'static str,
        second: &'static str,
    },

    #[error("permission name {name} is registered twice")]
    DuplicateName { name: &'static str },

    #[error("permission numbers must be dense: expected {expected}, found {found}")]
    Gap {
        expected: PermissionNumber,
        found: PermissionNumber,
    },
}

/// Immutable registry of every permission the application knows about.
#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    by_number: BTreeMap<PermissionNumber, Permission>,
    by_name: HashMap<&'static str, Permission>,
}

impl PermissionCatalog {
    /// Build a catalog, rejecting zero, duplicate or non-contiguous numbers and duplicate names.
    pub fn new(permissions: impl IntoIterator<Item = Permission>) -> Result<Self, CatalogError> {
        let mut by_number = BTreeMap::new();
        let mut by_name = HashMap::new();

        for permission in permissions {
            if permission.number < 1 {
                return Err(CatalogError::UnassignedNumber {
                    name: permission.name,
                });
            }
            if let Some(existing) = by_number.insert(permission.number, permission) {
                return Err(CatalogError::DuplicateNumber {
                    number: permission.number,
                    first: existing.name,
                    second: permission.name,
                });
            }
            if by_name.insert(permission.name, permission).is_some() {
                return Err(CatalogError::DuplicateName {
                    name: permission.name,
                });
            }
        }

        for (expected, found) in (1..).zip(by_number.keys().copied()) {
            if expected != found {
                return Err(CatalogError::Gap { expected, found });
            }
        }

        Ok(Self { by_number, by_name })
    }

    /// The catalog of built-in permissions.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::new(BUILTIN)
    }

    pub fn get(&self, number: PermissionNumber) -> Option<&Permission> {
        self.by_number.get(&number)
    }

    pub fn by_name(&self, name: &str) -> Option<&Permission> {
        self.by_name.get(name)
    }

    pub fn contains(&self, number: PermissionNumber) -> bool {
        self.by_number.contains_key(&number)
    }

    /// Iterate permissions in number order.
    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.by_number.values()
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }

    /// First number in `set` that the catalog does not know, if any.
    pub fn first_unknown(&self, set: &PermissionSet) -> Option<PermissionNumber> {
        set.iter()
            .map(|(number, _)| number)
            .find(|number| !self.contains(*number))
    }
}

/// Three-state read of a single permission in a [`PermissionSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    Granted,
    Denied,
    Unset,
}

impl Grant {
    /// Deny-by-default interpretation used at the API boundary.
    pub fn is_granted(self) -> bool {
        matches!(self, Grant::Granted)
    }
}

/// Sparse mapping from permission number to an explicit grant or deny.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(BTreeMap<PermissionNumber, bool>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an explicit grant or deny, replacing any previous value.
    pub fn set(&mut self, number: PermissionNumber, granted: bool) {
        self.0.insert(number, granted);
    }

    /// Set the value only if nothing is recorded for `number` yet. Returns whether it was set.
    pub fn set_if_unset(&mut self, number: PermissionNumber, granted: bool) -> bool {
        match self.0.entry(number) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(granted);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, number: PermissionNumber) -> Grant {
        match self.0.get(&number) {
            Some(true) => Grant::Granted,
            Some(false) => Grant::Denied,
            None => Grant::Unset,
        }
    }

    pub fn is_granted(&self, number: PermissionNumber) -> bool {
        self.get(number).is_granted()
    }

    pub fn contains(&self, number: PermissionNumber) -> bool {
        self.0.contains_key(&number)
    }

    pub fn remove(&mut self, number: PermissionNumber) -> Option<bool> {
        self.0.remove(&number)
    }

    /// Overlay `other` on top of `self`; entries in `other` win.
    pub fn merge(&mut self, other: &PermissionSet) {
        for (number, granted) in other.iter() {
            self.set(number, granted);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in ascending permission number order.
    pub fn iter(&self) -> impl Iterator<Item = (PermissionNumber, bool)> + '_ {
        self.0.iter().map(|(number, granted)| (*number, *granted))
    }
}

impl FromIterator<(PermissionNumber, bool)> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = (PermissionNumber, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for PermissionSet {
    type Item = (PermissionNumber, bool);
    type IntoIter = std::collections::btree_map::IntoIter<PermissionNumber, bool>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// JSON shape of one permission entry: `{ "display_name": ..., "granted": ... }`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PermissionState {
    pub display_name: &'static str,
    pub granted: bool,
}

/// Render a set keyed by permission name. Numbers unknown to the catalog are skipped.
pub fn describe(catalog: &PermissionCatalog, set: &PermissionSet) -> BTreeMap<&'static str, PermissionState> {
    set.iter()
        .filter_map(|(number, granted)| {
            let permission = catalog.get(number)?;
            Some((
                permission.name,
                PermissionState {
                    display_name: permission.display_name,
                    granted,
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_valid() {
        let catalog = PermissionCatalog::builtin().expect("builtin catalog");
        assert_eq!(catalog.len(), 35);
        assert_eq!(catalog.by_name("view_circle"), Some(&VIEW_CIRCLE));
        assert_eq!(catalog.get(35), Some(&MENTION_EVERYONE));
        assert!(catalog.get(36).is_none());
    }

    #[test]
    fn catalog_rejects_zero_number() {
        let err = PermissionCatalog::new([Permission::new(0, "broken", "Broken")]).unwrap_err();
        assert_eq!(err, CatalogError::UnassignedNumber { name: "broken" });
    }

    #[test]
    fn catalog_rejects_duplicate_number() {
        let err = PermissionCatalog::new([
            Permission::new(1, "a", "A"),
            Permission::new(1, "b", "B"),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            CatalogError::DuplicateNumber {
                number: 1,
                first: "a",
                second: "b"
            }
        );
    }

    #[test]
    fn catalog_rejects_duplicate_name_and_gaps() {
        let dup = PermissionCatalog::new([
            Permission::new(1, "a", "A"),
            Permission::new(2, "a", "A again"),
        ])
        .unwrap_err();
        assert_eq!(dup, CatalogError::DuplicateName { name: "a" });

        let gap = PermissionCatalog::new([
            Permission::new(1, "a", "A"),
            Permission::new(3, "c", "C"),
        ])
        .unwrap_err();
        assert_eq!(gap, CatalogError::Gap { expected: 2, found: 3 });
    }

    #[test]
    fn absent_differs_from_denied() {
        let mut set = PermissionSet::new();
        set.set(VIEW_CIRCLE.number, false);
        assert_eq!(set.get(VIEW_CIRCLE.number), Grant::Denied);
        assert_eq!(set.get(SEND_CONTENT.number), Grant::Unset);
        assert!(!set.is_granted(SEND_CONTENT.number));
    }

    #[test]
    fn set_if_unset_keeps_first_writer() {
        let mut set = PermissionSet::new();
        assert!(set.set_if_unset(3, true));
        assert!(!set.set_if_unset(3, false));
        assert_eq!(set.get(3), Grant::Granted);
    }

    #[test]
    fn merge_overrides_existing_entries() {
        let mut base: PermissionSet = [(1, true), (2, true)].into_iter().collect();
        let overlay: PermissionSet = [(2, false), (3, true)].into_iter().collect();
        base.merge(&overlay);
        assert_eq!(base, [(1, true), (2, false), (3, true)].into_iter().collect());
    }

    #[test]
    fn describe_keys_by_name_and_skips_unknown() {
        let catalog = PermissionCatalog::builtin().expect("builtin catalog");
        let set: PermissionSet = [(1, true), (999, true)].into_iter().collect();
        let described = describe(&catalog, &set);
        assert_eq!(described.len(), 1);
        assert_eq!(
            described["view_circle"],
            PermissionState {
                display_name: "View Circle",
                granted: true
            }
        );
    }
}

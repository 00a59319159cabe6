//! Path-scoped access control.
//!
//! A [`Role`] grants a [`Permission`] to schema paths. The grant that applies
//! to an operation is the one whose path is the longest segment-wise prefix
//! of the target; with no applicable grant the answer is
//! [`Permission::None`].

mod guard;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::path::Path;

pub use guard::Guard;

/// Ordered permission levels: each includes everything below it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    #[default]
    None,
    Read,
    Write,
    Full,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Read => "read",
            Self::Write => "write",
            Self::Full => "full",
        })
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "full" => Ok(Self::Full),
            other => Err(format!("unknown permission '{other}'")),
        }
    }
}

/// One grant: `permissions` on `path` and everything below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    pub path: String,
    pub permissions: Permission,
}

/// A named set of grants.
///
/// Serialized as `{ id, access = { "<path>" = "<permission>" } }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RoleTable", into = "RoleTable")]
pub struct Role {
    pub id: String,
    access: BTreeMap<String, AccessControl>,
}

#[derive(Serialize, Deserialize)]
struct RoleTable {
    #[serde(default)]
    id: String,
    #[serde(default)]
    access: BTreeMap<String, Permission>,
}

impl From<RoleTable> for Role {
    fn from(table: RoleTable) -> Self {
        let mut role = Role::new(table.id);
        for (path, permissions) in table.access {
            role.grant(&path, permissions);
        }
        role
    }
}

impl From<Role> for RoleTable {
    fn from(role: Role) -> Self {
        Self {
            id: role.id,
            access: role
                .access
                .into_values()
                .map(|ac| (ac.path, ac.permissions))
                .collect(),
        }
    }
}

impl Role {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            access: BTreeMap::new(),
        }
    }

    /// Grant `permissions` on `path` (schema form, `module/a/b`). A second
    /// grant on the same path replaces the first.
    pub fn grant(&mut self, path: &str, permissions: Permission) -> &mut Self {
        let path = path.trim_matches('/').to_string();
        self.access.insert(
            path.clone(),
            AccessControl { path, permissions },
        );
        self
    }

    pub fn with_grant(mut self, path: &str, permissions: Permission) -> Self {
        self.grant(path, permissions);
        self
    }

    pub fn access(&self) -> impl Iterator<Item = &AccessControl> {
        self.access.values()
    }

    /// Permission that applies to `path`.
    pub fn resolve(&self, path: &Path) -> Permission {
        self.resolve_schema_path(&path.schema_path())
    }

    /// Permission that applies to a schema path such as `birding/owner/name`.
    pub fn resolve_schema_path(&self, target: &str) -> Permission {
        self.access
            .values()
            .filter(|ac| covers(&ac.path, target))
            .max_by_key(|ac| ac.path.len())
            .map_or(Permission::None, |ac| ac.permissions)
    }

    /// `true` when `target` or some path below it grants at least
    /// [`Permission::Write`].
    pub fn writable_within(&self, target: &str) -> bool {
        self.resolve_schema_path(target) >= Permission::Write
            || self
                .access
                .values()
                .any(|ac| ac.permissions >= Permission::Write && covers(target, &ac.path))
    }
}

/// `true` when `prefix` equals `target` or ends at one of its `/` boundaries.
fn covers(prefix: &str, target: &str) -> bool {
    target
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

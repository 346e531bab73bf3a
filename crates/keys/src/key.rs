// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key records and permission evaluation.

use crate::error::KeyError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// The closed set of scoped permissions.
///
/// `manage` implies `write` implies `read` on the same scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Manage,
    Write,
    Read,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Manage => "manage",
            Permission::Write => "write",
            Permission::Read => "read",
        }
    }

    /// The stronger permission that implies this one, if any.
    fn implied_by(self) -> Option<Permission> {
        match self {
            Permission::Manage => None,
            Permission::Write => Some(Permission::Manage),
            Permission::Read => Some(Permission::Write),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manage" => Ok(Permission::Manage),
            "write" => Ok(Permission::Write),
            "read" => Ok(Permission::Read),
            other => Err(KeyError::UnknownPermission(other.to_string())),
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Structured permission grants stored on a key.
///
/// Scope sets hold `*` (everything), bare session names, or
/// `session.job` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default, skip_serializing_if = "is_false")]
    pub superuser: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub create_key: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub create_user: bool,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub manage: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub write: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub read: BTreeSet<String>,
}

impl Permissions {
    pub fn superuser() -> Self {
        Self {
            superuser: true,
            ..Self::default()
        }
    }

    fn set_for(&self, permission: Permission) -> &BTreeSet<String> {
        match permission {
            Permission::Manage => &self.manage,
            Permission::Write => &self.write,
            Permission::Read => &self.read,
        }
    }
}

/// The label + permissions half of a key row, serialized opaquely into
/// the backend's `data` column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyData {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub permissions: Permissions,
}

/// One API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    api_key: String,
    label: String,
    permissions: Permissions,
    dummy: bool,
}

impl Key {
    pub fn new(api_key: impl Into<String>, label: impl Into<String>, permissions: Permissions) -> Self {
        Self {
            api_key: api_key.into(),
            label: label.into(),
            permissions,
            dummy: false,
        }
    }

    /// The sentinel key used when authentication is disabled: every
    /// scoped check passes, but it cannot mint keys or users and is not
    /// a superuser. Never persisted.
    pub fn dummy() -> Self {
        Self {
            api_key: "dummy".to_string(),
            label: String::new(),
            permissions: Permissions::default(),
            dummy: true,
        }
    }

    /// Build a key from a JSON object of the form
    /// `{"key": …, "label": …, "permissions": …}`.
    pub fn load(obj: &serde_json::Value) -> Result<Self, KeyError> {
        let api_key = obj
            .get("key")
            .and_then(serde_json::Value::as_str)
            .ok_or(KeyError::InvalidKey)?;
        let label = obj
            .get("label")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let permissions = match obj.get("permissions") {
            Some(value) => serde_json::from_value(value.clone())?,
            None => Permissions::default(),
        };
        Ok(Self::new(api_key, label, permissions))
    }

    /// The inverse of [`Key::load`].
    pub fn dump(&self) -> serde_json::Value {
        serde_json::json!({
            "key": self.api_key,
            "label": self.label,
            "permissions": self.permissions,
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn permissions(&self) -> &Permissions {
        &self.permissions
    }

    pub fn data(&self) -> KeyData {
        KeyData {
            label: self.label.clone(),
            permissions: self.permissions.clone(),
        }
    }

    pub fn is_superuser(&self) -> bool {
        !self.dummy && self.permissions.superuser
    }

    pub fn can_create_key(&self) -> bool {
        !self.dummy && self.permissions.create_key
    }

    pub fn can_create_user(&self) -> bool {
        !self.dummy && self.permissions.create_user
    }

    /// Evaluate a scoped permission.
    ///
    /// Order: superuser bypass, then the implication chain (a `write`
    /// request first evaluates `manage`, a `read` request first
    /// evaluates `write`), then `*`, then the session half of a dotted
    /// scope, then the verbatim scope.
    pub fn can(&self, permission: Permission, scope: &str) -> bool {
        if self.dummy {
            return true;
        }
        if self.permissions.superuser {
            return true;
        }
        if let Some(stronger) = permission.implied_by() {
            if self.can(stronger, scope) {
                return true;
            }
        }
        let set = self.permissions.set_for(permission);
        if set.contains("*") {
            return true;
        }
        if let Some((session, _job)) = scope.split_once('.') {
            if set.contains(session) {
                return true;
            }
        }
        set.contains(scope)
    }

    pub fn can_manage(&self, scope: &str) -> bool {
        self.can(Permission::Manage, scope)
    }

    pub fn can_write(&self, scope: &str) -> bool {
        self.can(Permission::Write, scope)
    }

    pub fn can_read(&self, scope: &str) -> bool {
        self.can(Permission::Read, scope)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key: {}", self.api_key)
    }
}

#[cfg(test)]
#[path = "key_tests.rs"]
mod tests;

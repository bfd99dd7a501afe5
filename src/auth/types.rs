//! Identity and permission types.
//!
//! These are shared by the server (built from the store on every request) and
//! the client (deserialized from `/auth/me`).

use serde::{Deserialize, Serialize};

/// An action a permission grants on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Action::Create),
            "read" => Some(Action::Read),
            "update" => Some(Action::Update),
            "delete" => Some(Action::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub resource: String,
    pub action: Action,
}

impl Permission {
    pub fn new(resource: impl Into<String>, action: Action) -> Self {
        Self {
            resource: resource.into(),
            action,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub permissions: Vec<Permission>,
}

/// A resolved user with expanded roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Database user ID (never sent over the wire)
    #[serde(skip)]
    pub id: i64,
    pub uuid: String,
    pub username: String,
    pub email: String,
    pub active: bool,
    pub roles: Vec<Role>,
}

impl Identity {
    /// Whether this identity may perform `action` on `resource`.
    pub fn can(&self, resource: &str, action: Action) -> bool {
        super::guard::can_access_action(self, resource, action)
    }
}

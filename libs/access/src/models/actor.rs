//! Caller identity bound into every facade call

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role name that grants administrator access
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
}

/// Authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn admin(id: Uuid) -> Self {
        Self {
            id,
            role: Role::Admin,
        }
    }

    pub fn client(id: Uuid) -> Self {
        Self {
            id,
            role: Role::Client,
        }
    }

    /// Build an actor from the role names carried by a token
    pub fn from_roles(id: Uuid, roles: &[String]) -> Self {
        if roles.iter().any(|role| role.eq_ignore_ascii_case(ADMIN_ROLE)) {
            Self::admin(id)
        } else {
            Self::client(id)
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

//! Identity context passed into every mutating call
//!
//! The ledger core does not authenticate anyone. It receives an [`Actor`]
//! from the surrounding application and records the identifier verbatim;
//! roles are consulted only where a workflow step demands one.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Business role held by an actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Warehouse or logistics operator
    Operator,
    /// Books payments and settlements
    Accountant,
    /// Approves write-offs and liability outcomes
    Manager,
    /// Unrestricted
    Admin,
}

/// The authenticated caller of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Opaque identifier supplied by the identity layer
    pub id: String,
    /// Roles granted to the actor
    pub roles: Vec<Role>,
}

impl Actor {
    /// Creates an actor with the given roles
    pub fn new(id: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            id: id.into(),
            roles: roles.into_iter().collect(),
        }
    }

    /// Actor used for automatic transitions triggered by the core itself
    pub fn system() -> Self {
        Self::new("system", [Role::Admin])
    }

    /// Returns true if the actor holds at least one of the roles
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        self.roles.iter().any(|r| roles.contains(r))
    }

    /// Fails with `Unauthorized` unless the actor holds one of the roles
    pub fn require_any(&self, roles: &[Role], action: &str) -> Result<(), CoreError> {
        if self.has_any_role(roles) {
            Ok(())
        } else {
            Err(CoreError::Unauthorized(format!(
                "{} requires one of {:?}, actor {} has {:?}",
                action, roles, self.id, self.roles
            )))
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

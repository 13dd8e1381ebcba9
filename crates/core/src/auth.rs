use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::meta::{ActorRef, EntityKind};
use crate::errors::ApplicationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Accountant,
    Technician,
    Staff,
}

impl Role {
    pub const ALL: [Role; 5] =
        [Self::Admin, Self::Manager, Self::Accountant, Self::Technician, Self::Staff];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Accountant => "accountant",
            Self::Technician => "technician",
            Self::Staff => "staff",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "manager" => Some(Self::Manager),
            "accountant" => Some(Self::Accountant),
            "technician" => Some(Self::Technician),
            "staff" => Some(Self::Staff),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Create,
    Propose,
    Decide,
    SideTransition,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Propose => "propose",
            Self::Decide => "decide",
            Self::SideTransition => "change the status of",
            Self::Delete => "delete",
        };
        f.write_str(label)
    }
}

/// The authenticated caller, as supplied by the outer layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorRef,
    pub roles: BTreeSet<Role>,
}

impl Actor {
    pub fn new(id: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self { id: ActorRef::new(id), roles: roles.into_iter().collect() }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Roles that may perform `operation` on `kind`. An empty list means any authenticated actor.
pub fn required_roles(kind: EntityKind, operation: Operation) -> Vec<Role> {
    match operation {
        Operation::Read | Operation::Create | Operation::Propose => Vec::new(),
        Operation::Decide => match kind {
            EntityKind::Payment => vec![Role::Admin, Role::Manager, Role::Accountant],
            _ => vec![Role::Admin, Role::Manager],
        },
        Operation::SideTransition => match kind {
            EntityKind::Payment => vec![Role::Admin, Role::Manager, Role::Accountant],
            EntityKind::Ticket => vec![Role::Admin, Role::Manager, Role::Technician],
            _ => vec![Role::Admin, Role::Manager],
        },
        Operation::Delete => vec![Role::Admin],
    }
}

pub trait Authorizer: Send + Sync {
    fn is_authorized(&self, actor: &Actor, required: &[Role]) -> bool;

    /// Fails `Unauthorized` for an anonymous actor and `Forbidden` for a missing role.
    fn authorize(
        &self,
        actor: &Actor,
        kind: EntityKind,
        operation: Operation,
    ) -> Result<(), ApplicationError> {
        if actor.id.as_str().trim().is_empty() {
            return Err(ApplicationError::Unauthorized);
        }
        if self.is_authorized(actor, &required_roles(kind, operation)) {
            return Ok(());
        }
        Err(ApplicationError::Forbidden {
            actor: actor.id.to_string(),
            operation: operation.to_string(),
            kind,
        })
    }
}

/// Role-membership gate; `Admin` passes every check.
#[derive(Clone, Copy, Debug, Default)]
pub struct RoleAuthorizer;

impl Authorizer for RoleAuthorizer {
    fn is_authorized(&self, actor: &Actor, required: &[Role]) -> bool {
        required.is_empty()
            || actor.has_role(Role::Admin)
            || required.iter().any(|role| actor.has_role(*role))
    }
}

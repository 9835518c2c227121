//! The authenticated caller of an operation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{AdminId, AgentId, BuyerId, OwnerId, VendorId};

/// Coarse role of an actor, used for authorization checks and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Buyer,
    Vendor,
    Agent,
    Admin,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Vendor => "vendor",
            Role::Agent => "agent",
            Role::Admin => "admin",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(Role::Buyer),
            "vendor" => Ok(Role::Vendor),
            "agent" => Ok(Role::Agent),
            "admin" => Ok(Role::Admin),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Who is performing an action.
///
/// Supplied by the identity service on every call. One variant per role
/// means a caller is never simultaneously "a vendor and a client"; the
/// variant carries exactly the identifier that role has.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Buyer(BuyerId),
    Vendor(VendorId),
    Agent(AgentId),
    Admin(AdminId),
    /// An internal component, e.g. the settlement coordinator.
    System(String),
}

impl Actor {
    /// Convenience constructor for internal components.
    pub fn system(component: impl Into<String>) -> Self {
        Actor::System(component.into())
    }

    pub fn role(&self) -> Role {
        match self {
            Actor::Buyer(_) => Role::Buyer,
            Actor::Vendor(_) => Role::Vendor,
            Actor::Agent(_) => Role::Agent,
            Actor::Admin(_) => Role::Admin,
            Actor::System(_) => Role::System,
        }
    }

    /// Admins and internal components may act on behalf of anyone.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Actor::Admin(_) | Actor::System(_))
    }

    /// Returns true if this actor owns the given wallet.
    pub fn owns_wallet(&self, owner: OwnerId) -> bool {
        self.user_uuid() == Some(owner.as_uuid())
    }

    /// The identity-service user id, if this is a human actor.
    pub fn user_uuid(&self) -> Option<Uuid> {
        match self {
            Actor::Buyer(id) => Some(id.as_uuid()),
            Actor::Vendor(id) => Some(id.as_uuid()),
            Actor::Agent(id) => Some(id.as_uuid()),
            Actor::Admin(id) => Some(id.as_uuid()),
            Actor::System(_) => None,
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::System(component) => write!(f, "system:{component}"),
            other => match other.user_uuid() {
                Some(id) => write!(f, "{}:{id}", other.role()),
                None => write!(f, "{}", other.role()),
            },
        }
    }
}

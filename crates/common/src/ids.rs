//! Strongly typed party identifiers.
//!
//! Buyers, vendors, delivery agents and admins are issued by the identity
//! service; we only carry their UUIDs. Keeping them as distinct types stops
//! a vendor id from being passed where a buyer id is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! party_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

party_id!(
    /// A customer placing orders.
    BuyerId
);
party_id!(
    /// A seller listing products and issuing coupons.
    VendorId
);
party_id!(
    /// A delivery agent working for the logistics service.
    AgentId
);
party_id!(
    /// A back-office operator.
    AdminId
);
party_id!(
    /// The owner of a wallet. Any party can hold one.
    OwnerId
);

impl From<BuyerId> for OwnerId {
    fn from(id: BuyerId) -> Self {
        Self(id.0)
    }
}

impl From<VendorId> for OwnerId {
    fn from(id: VendorId) -> Self {
        Self(id.0)
    }
}

impl From<AgentId> for OwnerId {
    fn from(id: AgentId) -> Self {
        Self(id.0)
    }
}

//! Shared identifiers and the actor model used across every service.

pub mod actor;
pub mod ids;
pub mod types;

pub use actor::{Actor, Role};
pub use ids::{AdminId, AgentId, BuyerId, OwnerId, VendorId};
pub use types::AggregateId;

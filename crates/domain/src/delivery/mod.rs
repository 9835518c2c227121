//! Delivery assignment tracking.

mod aggregate;
mod events;
mod service;
mod state;

pub use aggregate::DeliveryAssignment;
pub use events::{AssignmentCreatedData, DeliveryEvent};
pub use service::DeliveryService;
pub use state::{AssignmentState, DeliveryEstimate};

use thiserror::Error;

use crate::error::ErrorKind;
use crate::order::FulfillmentState;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Delivery assignment not found")]
    NotFound,

    #[error("Order has not been placed")]
    OrderNotPlaced,

    #[error("Order in state {state} cannot be assigned")]
    OrderNotAssignable { state: FulfillmentState },

    #[error("Order is already assigned to agent {agent_id}")]
    AlreadyAssigned { agent_id: String },

    #[error("Invalid assignment transition from {from} to {to}")]
    InvalidTransition {
        from: AssignmentState,
        to: AssignmentState,
    },

    #[error("{actor} may not update assignment {assignment_id}")]
    Forbidden {
        actor: String,
        assignment_id: String,
    },
}

impl DeliveryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeliveryError::NotFound | DeliveryError::OrderNotPlaced => ErrorKind::NotFound,
            DeliveryError::OrderNotAssignable { .. }
            | DeliveryError::AlreadyAssigned { .. }
            | DeliveryError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            DeliveryError::Forbidden { .. } => ErrorKind::Forbidden,
        }
    }
}

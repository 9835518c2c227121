//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use commands::*;
pub use events::{
    FulfillmentChangedData, OrderEvent, OrderPlacedData, OrderRefundedData, PaymentConfirmedData,
    PaymentDeclinedData, ReturnRequestedData, ReturnResolvedData,
};
pub use service::OrderService;
pub use state::{FulfillmentState, PaymentState, ReturnDecision, ReturnState};
pub use value_objects::{
    DeliveryAddress, LineItem, PaymentMethod, ProductId, ReturnRequest, StatusChange,
};

use common::Actor;
use thiserror::Error;

use crate::error::ErrorKind;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order has not been placed")]
    NotPlaced,

    #[error("Order already placed")]
    AlreadyPlaced,

    #[error("Order has no items")]
    NoItems,

    #[error("Invalid quantity {quantity} for {product_id} (must be greater than 0)")]
    InvalidQuantity { product_id: String, quantity: u32 },

    #[error("Invalid price {price} for {product_id} (must be greater than 0)")]
    InvalidPrice { product_id: String, price: i64 },

    #[error("Order total exceeds the largest representable amount")]
    TotalTooLarge,

    #[error("Delivery address is missing {0}")]
    InvalidAddress(&'static str),

    #[error("Discount {discount} exceeds order total {total}")]
    InvalidDiscount { discount: i64, total: i64 },

    #[error("{actor} may not {action}")]
    Forbidden { actor: String, action: &'static str },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: FulfillmentState,
        to: FulfillmentState,
    },

    #[error("An agent is required to assign the order")]
    AgentRequired,

    #[error("Cannot {action} when payment is {current}")]
    InvalidPaymentTransition {
        current: PaymentState,
        action: &'static str,
    },

    #[error("Payment already settled by transaction {transaction_id}")]
    PaymentAlreadySettled { transaction_id: String },

    #[error("Transaction id is required")]
    MissingTransactionId,

    #[error("Order in state {state} cannot be returned")]
    NotReturnable { state: FulfillmentState },

    #[error("A return has already been requested")]
    ReturnAlreadyRequested,

    #[error("A return reason is required")]
    EmptyReason,

    #[error("No return has been requested")]
    NoReturnRequest,

    #[error("Return already resolved as {decision}")]
    ReturnAlreadyResolved { decision: ReturnDecision },

    #[error("Return is {state}, not approved")]
    ReturnNotApproved { state: ReturnState },

    #[error("Refund amount is required to approve a return")]
    RefundAmountRequired,

    #[error("Invalid refund amount {amount} (must be between 1 and {max})")]
    InvalidRefundAmount { amount: i64, max: i64 },

    #[error("Payment is {payment_state}, only paid orders can be refunded")]
    NotRefundable { payment_state: PaymentState },
}

impl OrderError {
    pub(crate) fn forbidden(actor: &Actor, action: &'static str) -> Self {
        OrderError::Forbidden {
            actor: actor.to_string(),
            action,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::NotPlaced => ErrorKind::NotFound,
            OrderError::Forbidden { .. } => ErrorKind::Forbidden,
            OrderError::NoItems
            | OrderError::InvalidQuantity { .. }
            | OrderError::InvalidPrice { .. }
            | OrderError::TotalTooLarge
            | OrderError::InvalidAddress(_)
            | OrderError::InvalidDiscount { .. }
            | OrderError::AgentRequired
            | OrderError::MissingTransactionId
            | OrderError::EmptyReason
            | OrderError::RefundAmountRequired
            | OrderError::InvalidRefundAmount { .. } => ErrorKind::Validation,
            OrderError::AlreadyPlaced
            | OrderError::InvalidTransition { .. }
            | OrderError::InvalidPaymentTransition { .. }
            | OrderError::PaymentAlreadySettled { .. }
            | OrderError::NotReturnable { .. }
            | OrderError::ReturnAlreadyRequested
            | OrderError::NoReturnRequest
            | OrderError::ReturnAlreadyResolved { .. }
            | OrderError::ReturnNotApproved { .. }
            | OrderError::NotRefundable { .. } => ErrorKind::InvalidTransition,
        }
    }
}

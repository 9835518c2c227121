//! Domain layer for the marketplace settlement backend.
//!
//! This crate provides the core domain abstractions including:
//! - Aggregate trait for event-sourced entities
//! - Command trait and CommandHandler with per-aggregate serialization
//! - Order aggregate with fulfillment, payment and return state machines
//! - Wallet ledger, delivery assignments and agent commission
//! - Coupon validation rules

pub mod aggregate;
pub mod command;
pub mod commission;
pub mod coupon;
pub mod delivery;
pub mod error;
pub mod locks;
pub mod money;
pub mod order;
pub mod wallet;

pub use aggregate::{Aggregate, DomainEvent, SnapshotCapable};
pub use command::{Command, CommandHandler, CommandResult};
pub use commission::{
    CommissionEntry, CommissionError, CommissionEvent, CommissionRate, CommissionService,
    CommissionState,
};
pub use coupon::{Coupon, CouponValidation, Discount};
pub use delivery::{
    AssignmentState, DeliveryAssignment, DeliveryError, DeliveryEstimate, DeliveryEvent,
    DeliveryService,
};
pub use error::{DomainError, ErrorKind, event_store_error_kind};
pub use locks::AggregateLocks;
pub use money::Money;
pub use order::{
    DeliveryAddress, FulfillmentState, LineItem, Order, OrderError, OrderEvent, OrderService,
    PaymentMethod, PaymentState, PlaceOrder, ProcessReturn, ProductId, RequestReturn,
    ReturnDecision, ReturnRequest, ReturnState, StatusChange, TransitionOrder,
};
pub use wallet::{
    EntryDirection, EntryState, LedgerEntry, LedgerReceipt, PayoutDetails, Posting,
    SettleWithdrawal, Wallet, WalletError, WalletEvent, WalletService, Withdraw,
    WithdrawalOutcome,
};

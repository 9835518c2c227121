//! Settlement coordination for marketplace orders.
//!
//! No two services share a transaction, so an order's life is driven as a
//! sequence of idempotent steps:
//! 1. Place the order (coupon checked first, wallet debited after)
//! 2. Assign and track delivery, keeping the order in step
//! 3. On delivery, pay the vendor and the agent's commission
//! 4. On an approved return, refund the buyer
//!
//! Each downstream step is retried with backoff under a timeout. Steps that
//! still fail go to a durable reconciliation queue and are re-run later.

pub mod action;
pub mod aggregate;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod queue;
pub mod retry;
pub mod services;
pub mod state;

pub use action::ReconciliationAction;
pub use aggregate::ReconciliationTask;
pub use config::SettlementConfig;
pub use coordinator::{
    AssignmentAdvance, PaymentOutcome, ReconciliationReport, SettlementCoordinator, refund_key,
    wallet_payment_key,
};
pub use error::SettlementError;
pub use events::ReconciliationEvent;
pub use queue::ReconciliationQueue;
pub use retry::RetryPolicy;
pub use services::{
    CouponCatalog, InMemoryCouponCatalog, InMemoryLogistics, LedgerClient, LocalLedger,
    LogisticsNotifier,
};
pub use state::TaskState;

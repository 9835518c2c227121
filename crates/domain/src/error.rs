//! Domain error types.

use event_store::EventStoreError;
use thiserror::Error;

use crate::commission::CommissionError;
use crate::delivery::DeliveryError;
use crate::order::OrderError;
use crate::wallet::WalletError;

/// Coarse classification shared by every layer.
///
/// Callers decide whether to retry, and the HTTP layer picks a status
/// code, from the kind alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input. Never retried.
    Validation,
    NotFound,
    /// The actor may not perform this action.
    Forbidden,
    /// Illegal state change. Never retried.
    InvalidTransition,
    InsufficientBalance,
    /// A downstream call timed out or failed.
    RemoteUnavailable,
    /// Lost a race on an order or wallet; retry the whole operation.
    ConcurrencyConflict,
    Internal,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RemoteUnavailable | ErrorKind::ConcurrencyConflict
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::InsufficientBalance => "insufficient_balance",
            ErrorKind::RemoteUnavailable => "remote_unavailable",
            ErrorKind::ConcurrencyConflict => "concurrency_conflict",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies event store failures.
pub fn event_store_error_kind(error: &EventStoreError) -> ErrorKind {
    match error {
        EventStoreError::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
        EventStoreError::AggregateNotFound(_) => ErrorKind::NotFound,
        e if e.is_unavailable() => ErrorKind::RemoteUnavailable,
        _ => ErrorKind::Internal,
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Commission error: {0}")]
    Commission(#[from] CommissionError),

    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    /// A stored event or snapshot could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::EventStore(e) => event_store_error_kind(e),
            DomainError::Order(e) => e.kind(),
            DomainError::Wallet(e) => e.kind(),
            DomainError::Delivery(e) => e.kind(),
            DomainError::Commission(e) => e.kind(),
            DomainError::AggregateNotFound { .. } => ErrorKind::NotFound,
            DomainError::Serialization(_) => ErrorKind::Internal,
        }
    }

    pub fn not_found(aggregate_type: &'static str, aggregate_id: impl ToString) -> Self {
        DomainError::AggregateNotFound {
            aggregate_type,
            aggregate_id: aggregate_id.to_string(),
        }
    }
}

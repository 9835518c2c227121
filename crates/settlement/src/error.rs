//! Settlement error types.

use common::AggregateId;
use domain::{DomainError, ErrorKind, event_store_error_kind};
use event_store::EventStoreError;
use thiserror::Error;

/// Errors that can occur while coordinating settlement steps.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// A coupon code was supplied but did not validate.
    #[error("Invalid coupon: {code}")]
    InvalidCoupon { code: String },

    /// A downstream service refused or failed the call.
    #[error("{service} unavailable: {reason}")]
    RemoteUnavailable {
        service: &'static str,
        reason: String,
    },

    /// A step did not answer within the request timeout.
    #[error("Step '{step}' timed out after {timeout_ms} ms")]
    Timeout { step: &'static str, timeout_ms: u64 },

    #[error("Order not found: {0}")]
    OrderNotFound(AggregateId),

    #[error("Delivery assignment not found: {0}")]
    AssignmentNotFound(AggregateId),

    #[error("Reconciliation task not found: {0}")]
    TaskNotFound(AggregateId),

    #[error("{actor} may not {action}")]
    Forbidden { actor: String, action: &'static str },

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SettlementError {
    pub fn remote(service: &'static str, reason: impl Into<String>) -> Self {
        SettlementError::RemoteUnavailable {
            service,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::InvalidCoupon { .. } => ErrorKind::Validation,
            SettlementError::RemoteUnavailable { .. } | SettlementError::Timeout { .. } => {
                ErrorKind::RemoteUnavailable
            }
            SettlementError::OrderNotFound(_)
            | SettlementError::AssignmentNotFound(_)
            | SettlementError::TaskNotFound(_) => ErrorKind::NotFound,
            SettlementError::Forbidden { .. } => ErrorKind::Forbidden,
            SettlementError::Domain(e) => e.kind(),
            SettlementError::EventStore(e) => event_store_error_kind(e),
            SettlementError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// True when running the same step again may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Convenience type alias for settlement results.
pub type Result<T> = std::result::Result<T, SettlementError>;

#[cfg(test)]
mod tests {
    use super::*;
    use domain::WalletError;
    use event_store::Version;

    #[test]
    fn test_timeouts_are_retryable() {
        let err = SettlementError::Timeout {
            step: "push_order_status",
            timeout_ms: 5000,
        };
        assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_invalid_coupon_is_validation() {
        let err = SettlementError::InvalidCoupon {
            code: "SAVE10".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_domain_kind_passes_through() {
        let err = SettlementError::from(DomainError::from(WalletError::InsufficientBalance {
            balance: 50,
            requested: 60,
        }));
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_store_conflict_is_retryable() {
        let err = SettlementError::from(EventStoreError::ConcurrencyConflict {
            aggregate_id: AggregateId::new(),
            expected: Version::initial(),
            actual: Version::first(),
        });
        assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);
        assert!(err.is_retryable());
    }
}

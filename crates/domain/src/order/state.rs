//! Order state machines.
//!
//! An order carries three independent machines: fulfillment, payment and
//! an optional return request.

use serde::{Deserialize, Serialize};

/// Delivery progress of an order.
///
/// ```text
/// InProgress ──► Assigned ──► Delivered
///      │             │
///      └─────────────┴──► Canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentState {
    #[default]
    InProgress,

    /// A delivery agent has been assigned.
    Assigned,

    /// Terminal for delivery; returns may still be requested.
    Delivered,

    /// Sink state.
    Canceled,
}

impl FulfillmentState {
    /// Returns true if `target` is a legal next state.
    pub fn can_transition_to(&self, target: FulfillmentState) -> bool {
        use FulfillmentState::*;
        matches!(
            (self, target),
            (InProgress, Assigned) | (Assigned, Delivered) | (InProgress | Assigned, Canceled)
        )
    }

    pub fn can_assign(&self) -> bool {
        self.can_transition_to(FulfillmentState::Assigned)
    }

    pub fn can_deliver(&self) -> bool {
        self.can_transition_to(FulfillmentState::Delivered)
    }

    pub fn can_cancel(&self) -> bool {
        self.can_transition_to(FulfillmentState::Canceled)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FulfillmentState::Delivered | FulfillmentState::Canceled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentState::InProgress => "IN_PROGRESS",
            FulfillmentState::Assigned => "ASSIGNED",
            FulfillmentState::Delivered => "DELIVERED",
            FulfillmentState::Canceled => "CANCELED",
        }
    }
}

impl std::fmt::Display for FulfillmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FulfillmentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(FulfillmentState::InProgress),
            "ASSIGNED" => Ok(FulfillmentState::Assigned),
            "DELIVERED" => Ok(FulfillmentState::Delivered),
            "CANCELED" => Ok(FulfillmentState::Canceled),
            other => Err(format!("unknown fulfillment state: {other}")),
        }
    }
}

/// Payment progress of an order.
///
/// `Pending → Paid | Failed`, and `Paid → Refunded` through an approved return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentState {
    /// Returns true if a gateway outcome can still be recorded.
    pub fn can_settle(&self) -> bool {
        matches!(self, PaymentState::Pending)
    }

    pub fn can_refund(&self) -> bool {
        matches!(self, PaymentState::Paid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "PENDING",
            PaymentState::Paid => "PAID",
            PaymentState::Failed => "FAILED",
            PaymentState::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a return request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnState {
    #[default]
    Pending,
    Approved,
    Rejected,
    /// Approved and the refund credit has landed.
    Refunded,
}

impl ReturnState {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, ReturnState::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnState::Pending => "PENDING",
            ReturnState::Approved => "APPROVED",
            ReturnState::Rejected => "REJECTED",
            ReturnState::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for ReturnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vendor's or admin's answer to a return request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnDecision {
    Approved,
    Rejected,
}

impl ReturnDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnDecision::Approved => "APPROVED",
            ReturnDecision::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for ReturnDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FulfillmentState::*;

    const ALL: [FulfillmentState; 4] = [InProgress, Assigned, Delivered, Canceled];

    #[test]
    fn test_default_state_is_in_progress() {
        assert_eq!(FulfillmentState::default(), InProgress);
        assert_eq!(PaymentState::default(), PaymentState::Pending);
    }

    #[test]
    fn test_forward_path() {
        assert!(InProgress.can_transition_to(Assigned));
        assert!(Assigned.can_transition_to(Delivered));
        assert!(!InProgress.can_transition_to(Delivered));
    }

    #[test]
    fn test_never_moves_backwards() {
        assert!(!Delivered.can_transition_to(Assigned));
        assert!(!Delivered.can_transition_to(InProgress));
        assert!(!Assigned.can_transition_to(InProgress));
        for state in ALL {
            assert!(!Canceled.can_transition_to(state));
        }
    }

    #[test]
    fn test_cancel_only_from_in_progress_or_assigned() {
        assert!(InProgress.can_cancel());
        assert!(Assigned.can_cancel());
        assert!(!Delivered.can_cancel());
        assert!(!Canceled.can_cancel());
    }

    #[test]
    fn test_same_state_is_not_a_transition() {
        for state in ALL {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!InProgress.is_terminal());
        assert!(!Assigned.is_terminal());
        assert!(Delivered.is_terminal());
        assert!(Canceled.is_terminal());
    }

    #[test]
    fn test_payment_predicates() {
        assert!(PaymentState::Pending.can_settle());
        assert!(!PaymentState::Paid.can_settle());
        assert!(PaymentState::Paid.can_refund());
        assert!(!PaymentState::Failed.can_refund());
        assert!(!PaymentState::Refunded.can_refund());
    }

    #[test]
    fn test_return_resolution() {
        assert!(!ReturnState::Pending.is_resolved());
        assert!(ReturnState::Approved.is_resolved());
        assert!(ReturnState::Rejected.is_resolved());
    }

    #[test]
    fn test_wire_names_round_trip() {
        for state in ALL {
            assert_eq!(state.as_str().parse::<FulfillmentState>().unwrap(), state);
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
        assert!("SHIPPED".parse::<FulfillmentState>().is_err());
    }
}

//! Entries of the per-recipient notification feed.

use chrono::{DateTime, Utc};
use common::{Actor, AggregateId};
use domain::{FulfillmentState, Money};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    OrderStateChanged { state: FulfillmentState },
    CommissionPaid { amount: Money },
    RefundIssued { amount: Money },
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OrderStateChanged { .. } => "order_state_changed",
            NotificationKind::CommissionPaid { .. } => "commission_paid",
            NotificationKind::RefundIssued { .. } => "refund_issued",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Position in the feed across all recipients; later entries are larger.
    pub sequence: u64,
    pub recipient: Actor,
    pub order_id: AggregateId,
    #[serde(flatten)]
    pub kind: NotificationKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub(crate) fn new(
        sequence: u64,
        recipient: Actor,
        order_id: AggregateId,
        kind: NotificationKind,
        at: DateTime<Utc>,
    ) -> Self {
        let message = match &kind {
            NotificationKind::OrderStateChanged { state } => {
                format!("Order {order_id} is now {state}")
            }
            NotificationKind::CommissionPaid { amount } => {
                format!("Commission of {amount} paid for order {order_id}")
            }
            NotificationKind::RefundIssued { amount } => {
                format!("Refund of {amount} issued for order {order_id}")
            }
        };
        Self {
            sequence,
            recipient,
            order_id,
            kind,
            message,
            at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::AgentId;

    #[test]
    fn test_serializes_kind_inline() {
        let order_id = AggregateId::new();
        let note = Notification::new(
            1,
            Actor::Agent(AgentId::new()),
            order_id,
            NotificationKind::CommissionPaid {
                amount: Money::from_cents(1250),
            },
            Utc::now(),
        );

        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["kind"], "commission_paid");
        assert_eq!(json["amount"], 1250);
        assert_eq!(json["recipient"]["role"], "agent");
        assert!(note.message.contains("$12.50"));
    }
}

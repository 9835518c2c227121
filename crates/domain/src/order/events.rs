//! Order domain events.

use chrono::{DateTime, Utc};
use common::{Actor, AgentId, AggregateId, BuyerId, VendorId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::money::Money;

use super::{DeliveryAddress, FulfillmentState, LineItem, PaymentMethod, ReturnDecision};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Buyer checked out.
    OrderPlaced(OrderPlacedData),

    /// Fulfillment state moved forward or to CANCELED.
    FulfillmentChanged(FulfillmentChangedData),

    /// Payment captured (gateway, wallet debit, or cash on delivery).
    PaymentConfirmed(PaymentConfirmedData),

    PaymentDeclined(PaymentDeclinedData),

    ReturnRequested(ReturnRequestedData),

    /// Vendor or admin approved or rejected the return.
    ReturnResolved(ReturnResolvedData),

    /// The refund credit reached the buyer's wallet.
    OrderRefunded(OrderRefundedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::FulfillmentChanged(_) => "FulfillmentChanged",
            OrderEvent::PaymentConfirmed(_) => "PaymentConfirmed",
            OrderEvent::PaymentDeclined(_) => "PaymentDeclined",
            OrderEvent::ReturnRequested(_) => "ReturnRequested",
            OrderEvent::ReturnResolved(_) => "ReturnResolved",
            OrderEvent::OrderRefunded(_) => "OrderRefunded",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: AggregateId,
    pub buyer_id: BuyerId,
    pub vendor_id: VendorId,
    pub line_items: Vec<LineItem>,
    pub address: DeliveryAddress,
    pub coupon_code: Option<String>,
    pub payment_method: PaymentMethod,

    /// Sum of line totals.
    pub total_amount: Money,

    /// Never more than `total_amount`.
    pub discount_amount: Money,

    pub placed_by: Actor,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentChangedData {
    pub from: FulfillmentState,
    pub to: FulfillmentState,
    pub actor: Actor,

    /// Set when moving to ASSIGNED.
    pub agent_id: Option<AgentId>,

    pub reason: Option<String>,

    /// Strictly later than every earlier status change on the order.
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmedData {
    /// Gateway transaction id, `order-payment:{id}` for wallet payments or
    /// `cod:{id}` for cash on delivery.
    pub transaction_id: String,
    pub amount: Money,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDeclinedData {
    pub transaction_id: String,
    pub reason: String,
    pub declined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnRequestedData {
    pub reason: String,
    pub requested_by: Actor,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnResolvedData {
    pub decision: ReturnDecision,

    /// Present only for approvals.
    pub refund_amount: Option<Money>,

    pub resolved_by: Actor,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRefundedData {
    pub amount: Money,

    /// Idempotency key of the ledger credit that paid the refund.
    pub ledger_key: String,

    pub refunded_at: DateTime<Utc>,
}

// Convenience constructors for events
impl OrderEvent {
    pub fn fulfillment_changed(
        from: FulfillmentState,
        to: FulfillmentState,
        actor: Actor,
        agent_id: Option<AgentId>,
        reason: Option<String>,
        changed_at: DateTime<Utc>,
    ) -> Self {
        OrderEvent::FulfillmentChanged(FulfillmentChangedData {
            from,
            to,
            actor,
            agent_id,
            reason,
            changed_at,
        })
    }

    pub fn payment_confirmed(transaction_id: impl Into<String>, amount: Money) -> Self {
        OrderEvent::PaymentConfirmed(PaymentConfirmedData {
            transaction_id: transaction_id.into(),
            amount,
            confirmed_at: Utc::now(),
        })
    }

    pub fn payment_declined(transaction_id: impl Into<String>, reason: impl Into<String>) -> Self {
        OrderEvent::PaymentDeclined(PaymentDeclinedData {
            transaction_id: transaction_id.into(),
            reason: reason.into(),
            declined_at: Utc::now(),
        })
    }

    pub fn return_requested(reason: impl Into<String>, requested_by: Actor) -> Self {
        OrderEvent::ReturnRequested(ReturnRequestedData {
            reason: reason.into(),
            requested_by,
            requested_at: Utc::now(),
        })
    }

    pub fn return_resolved(
        decision: ReturnDecision,
        refund_amount: Option<Money>,
        resolved_by: Actor,
    ) -> Self {
        OrderEvent::ReturnResolved(ReturnResolvedData {
            decision,
            refund_amount,
            resolved_by,
            resolved_at: Utc::now(),
        })
    }

    pub fn order_refunded(amount: Money, ledger_key: impl Into<String>) -> Self {
        OrderEvent::OrderRefunded(OrderRefundedData {
            amount,
            ledger_key: ledger_key.into(),
            refunded_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        assert_eq!(
            OrderEvent::payment_confirmed("tx-1", Money::from_cents(100)).event_type(),
            "PaymentConfirmed"
        );
        assert_eq!(
            OrderEvent::return_requested("broken", Actor::Buyer(BuyerId::new())).event_type(),
            "ReturnRequested"
        );
    }

    #[test]
    fn test_tagged_serialization() {
        let event = OrderEvent::fulfillment_changed(
            FulfillmentState::InProgress,
            FulfillmentState::Assigned,
            Actor::system("coordinator"),
            Some(AgentId::new()),
            None,
            Utc::now(),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "FulfillmentChanged");
        assert_eq!(json["data"]["to"], "ASSIGNED");

        let back: OrderEvent = serde_json::from_value(json).unwrap();
        assert!(matches!(back, OrderEvent::FulfillmentChanged(d) if d.from == FulfillmentState::InProgress));
    }
}

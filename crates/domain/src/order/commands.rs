//! Order commands.

use common::{Actor, AgentId, AggregateId, BuyerId, VendorId};

use crate::command::Command;
use crate::money::Money;

use super::{DeliveryAddress, FulfillmentState, LineItem, Order, PaymentMethod, ReturnDecision};

/// Command to place a new order at checkout.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub order_id: AggregateId,
    pub buyer_id: BuyerId,
    pub vendor_id: VendorId,
    pub line_items: Vec<LineItem>,
    pub address: DeliveryAddress,

    /// Validated by the caller before the order is placed.
    pub coupon_code: Option<String>,

    pub payment_method: PaymentMethod,
}

impl PlaceOrder {
    pub fn new(
        order_id: AggregateId,
        buyer_id: BuyerId,
        vendor_id: VendorId,
        line_items: Vec<LineItem>,
        address: DeliveryAddress,
    ) -> Self {
        Self {
            order_id,
            buyer_id,
            vendor_id,
            line_items,
            address,
            coupon_code: None,
            payment_method: PaymentMethod::default(),
        }
    }

    pub fn with_coupon(mut self, code: impl Into<String>) -> Self {
        self.coupon_code = Some(code.into());
        self
    }

    pub fn with_payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = method;
        self
    }

    /// Sum of the line totals before any discount.
    pub fn subtotal(&self) -> Money {
        self.line_items.iter().map(LineItem::total_price).sum()
    }
}

impl Command for PlaceOrder {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}

/// Command to move an order's fulfillment state.
#[derive(Debug, Clone)]
pub struct TransitionOrder {
    pub order_id: AggregateId,
    pub target: FulfillmentState,
    pub actor: Actor,

    /// Required when `target` is `Assigned`.
    pub agent_id: Option<AgentId>,

    pub reason: Option<String>,
}

impl TransitionOrder {
    pub fn new(order_id: AggregateId, target: FulfillmentState, actor: Actor) -> Self {
        Self {
            order_id,
            target,
            actor,
            agent_id: None,
            reason: None,
        }
    }

    pub fn with_agent(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl Command for TransitionOrder {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}

/// Command to open a return request on a delivered order.
#[derive(Debug, Clone)]
pub struct RequestReturn {
    pub order_id: AggregateId,
    pub reason: String,
    pub actor: Actor,
}

impl RequestReturn {
    pub fn new(order_id: AggregateId, reason: impl Into<String>, actor: Actor) -> Self {
        Self {
            order_id,
            reason: reason.into(),
            actor,
        }
    }
}

impl Command for RequestReturn {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}

/// Command to approve or reject a pending return.
#[derive(Debug, Clone)]
pub struct ProcessReturn {
    pub order_id: AggregateId,
    pub decision: ReturnDecision,

    /// Required for approvals.
    pub refund_amount: Option<Money>,

    pub actor: Actor,
}

impl ProcessReturn {
    pub fn approve(order_id: AggregateId, refund_amount: Money, actor: Actor) -> Self {
        Self {
            order_id,
            decision: ReturnDecision::Approved,
            refund_amount: Some(refund_amount),
            actor,
        }
    }

    pub fn reject(order_id: AggregateId, actor: Actor) -> Self {
        Self {
            order_id,
            decision: ReturnDecision::Rejected,
            refund_amount: None,
            actor,
        }
    }
}

impl Command for ProcessReturn {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_order_subtotal() {
        let cmd = PlaceOrder::new(
            AggregateId::new(),
            BuyerId::new(),
            VendorId::new(),
            vec![
                LineItem::new("SKU-1", "Mug", Money::from_cents(1200), 2),
                LineItem::new("SKU-2", "Spoon", Money::from_cents(300), 1),
            ],
            DeliveryAddress::new("1 Main St", "Nairobi", "KE"),
        )
        .with_coupon("SAVE10");

        assert_eq!(cmd.subtotal().cents(), 2700);
        assert_eq!(cmd.coupon_code.as_deref(), Some("SAVE10"));
        assert_eq!(cmd.payment_method, PaymentMethod::Card);
    }

    #[test]
    fn test_commands_target_the_order() {
        let order_id = AggregateId::new();
        let actor = Actor::system("test");

        let cmd = TransitionOrder::new(order_id, FulfillmentState::Assigned, actor.clone())
            .with_agent(AgentId::new());
        assert_eq!(cmd.aggregate_id(), order_id);
        assert!(cmd.agent_id.is_some());

        let cmd = ProcessReturn::approve(order_id, Money::from_cents(500), actor.clone());
        assert_eq!(cmd.decision, ReturnDecision::Approved);
        assert_eq!(cmd.aggregate_id(), order_id);

        let cmd = ProcessReturn::reject(order_id, actor);
        assert!(cmd.refund_amount.is_none());
    }
}

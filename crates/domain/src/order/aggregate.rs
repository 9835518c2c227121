//! Order aggregate implementation.

use chrono::{DateTime, Duration, Utc};
use common::{Actor, AgentId, AggregateId, BuyerId, VendorId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::money::Money;

use super::{
    DeliveryAddress, FulfillmentState, LineItem, OrderError, OrderEvent, PaymentMethod,
    PaymentState, PlaceOrder, ReturnDecision, ReturnRequest, ReturnState, StatusChange,
    events::{FulfillmentChangedData, OrderPlacedData, ReturnResolvedData},
};

/// Order aggregate root.
///
/// Carries three independent state machines (fulfillment, payment, return)
/// plus the append-only status history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    buyer_id: Option<BuyerId>,
    vendor_id: Option<VendorId>,

    /// Delivery agent, set when the order is assigned.
    agent_id: Option<AgentId>,

    line_items: Vec<LineItem>,
    address: DeliveryAddress,
    coupon_code: Option<String>,
    payment_method: PaymentMethod,
    total_amount: Money,
    discount_amount: Money,

    fulfillment_state: FulfillmentState,
    payment_state: PaymentState,
    payment_transaction_id: Option<String>,
    return_request: Option<ReturnRequest>,

    status_history: Vec<StatusChange>,
    placed_at: Option<DateTime<Utc>>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderPlaced(data) => self.apply_placed(data),
            OrderEvent::FulfillmentChanged(data) => self.apply_fulfillment_changed(data),
            OrderEvent::PaymentConfirmed(data) => {
                self.payment_state = PaymentState::Paid;
                self.payment_transaction_id = Some(data.transaction_id);
            }
            OrderEvent::PaymentDeclined(data) => {
                self.payment_state = PaymentState::Failed;
                self.payment_transaction_id = Some(data.transaction_id);
            }
            OrderEvent::ReturnRequested(data) => {
                self.return_request = Some(ReturnRequest {
                    reason: data.reason,
                    state: ReturnState::Pending,
                    requested_at: data.requested_at,
                    decision: None,
                    refund_amount: None,
                    resolved_by: None,
                    resolved_at: None,
                });
            }
            OrderEvent::ReturnResolved(data) => self.apply_return_resolved(data),
            OrderEvent::OrderRefunded(_) => {
                self.payment_state = PaymentState::Refunded;
                if let Some(request) = self.return_request.as_mut() {
                    request.state = ReturnState::Refunded;
                }
            }
        }
    }
}

impl SnapshotCapable for Order {
    fn snapshot_interval() -> usize {
        50
    }
}

// Query methods
impl Order {
    pub fn buyer_id(&self) -> Option<BuyerId> {
        self.buyer_id
    }

    pub fn vendor_id(&self) -> Option<VendorId> {
        self.vendor_id
    }

    pub fn agent_id(&self) -> Option<AgentId> {
        self.agent_id
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn address(&self) -> &DeliveryAddress {
        &self.address
    }

    pub fn coupon_code(&self) -> Option<&str> {
        self.coupon_code.as_deref()
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn discount_amount(&self) -> Money {
        self.discount_amount
    }

    /// `total_amount - discount_amount`, never negative.
    pub fn final_amount(&self) -> Money {
        self.total_amount - self.discount_amount
    }

    pub fn fulfillment_state(&self) -> FulfillmentState {
        self.fulfillment_state
    }

    pub fn payment_state(&self) -> PaymentState {
        self.payment_state
    }

    pub fn payment_transaction_id(&self) -> Option<&str> {
        self.payment_transaction_id.as_deref()
    }

    pub fn return_request(&self) -> Option<&ReturnRequest> {
        self.return_request.as_ref()
    }

    pub fn status_history(&self) -> &[StatusChange] {
        &self.status_history
    }

    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.placed_at
    }

    pub fn is_placed(&self) -> bool {
        self.id.is_some()
    }

    pub fn is_buyer(&self, actor: &Actor) -> bool {
        matches!(actor, Actor::Buyer(id) if Some(*id) == self.buyer_id)
    }

    pub fn is_vendor(&self, actor: &Actor) -> bool {
        matches!(actor, Actor::Vendor(id) if Some(*id) == self.vendor_id)
    }

    pub fn is_assigned_agent(&self, actor: &Actor) -> bool {
        matches!(actor, Actor::Agent(id) if Some(*id) == self.agent_id)
    }

    /// Buyers, the vendor, the assigned agent and privileged actors may read.
    pub fn is_visible_to(&self, actor: &Actor) -> bool {
        actor.is_privileged()
            || self.is_buyer(actor)
            || self.is_vendor(actor)
            || self.is_assigned_agent(actor)
    }
}

// Command methods (return events)
impl Order {
    /// Places a new order with a discount already validated by the caller.
    pub fn place(
        &self,
        cmd: &PlaceOrder,
        discount: Money,
        placed_by: &Actor,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyPlaced);
        }

        if !placed_by.is_privileged() && *placed_by != Actor::Buyer(cmd.buyer_id) {
            return Err(OrderError::forbidden(placed_by, "place order"));
        }

        if cmd.line_items.is_empty() {
            return Err(OrderError::NoItems);
        }

        for item in &cmd.line_items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id.to_string(),
                    quantity: item.quantity,
                });
            }
            if !item.unit_price.is_positive() {
                return Err(OrderError::InvalidPrice {
                    product_id: item.product_id.to_string(),
                    price: item.unit_price.cents(),
                });
            }
        }

        if let Some(field) = cmd.address.missing_field() {
            return Err(OrderError::InvalidAddress(field));
        }

        let total_amount = cmd
            .line_items
            .iter()
            .try_fold(Money::zero(), |acc, item| {
                item.checked_total_price().and_then(|line| acc.checked_add(line))
            })
            .ok_or(OrderError::TotalTooLarge)?;
        if discount.is_negative() || discount > total_amount {
            return Err(OrderError::InvalidDiscount {
                discount: discount.cents(),
                total: total_amount.cents(),
            });
        }

        Ok(vec![OrderEvent::OrderPlaced(OrderPlacedData {
            order_id: cmd.order_id,
            buyer_id: cmd.buyer_id,
            vendor_id: cmd.vendor_id,
            line_items: cmd.line_items.clone(),
            address: cmd.address.clone(),
            coupon_code: cmd.coupon_code.clone(),
            payment_method: cmd.payment_method,
            total_amount,
            discount_amount: discount,
            placed_by: placed_by.clone(),
            placed_at: Utc::now(),
        })])
    }

    /// Moves the fulfillment state to `target`.
    ///
    /// Buyers may only cancel their own orders, vendors may act on their
    /// own orders, and agents on orders assigned to them. Delivering a
    /// cash-on-delivery order also records the payment.
    pub fn transition(
        &self,
        target: FulfillmentState,
        actor: &Actor,
        agent_id: Option<AgentId>,
        reason: Option<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;

        let allowed = match actor {
            Actor::Buyer(_) => self.is_buyer(actor) && target == FulfillmentState::Canceled,
            Actor::Vendor(_) => self.is_vendor(actor),
            Actor::Agent(_) => self.is_assigned_agent(actor),
            Actor::Admin(_) | Actor::System(_) => true,
        };
        if !allowed {
            return Err(OrderError::forbidden(actor, "transition order"));
        }

        if !self.fulfillment_state.can_transition_to(target) {
            return Err(OrderError::InvalidTransition {
                from: self.fulfillment_state,
                to: target,
            });
        }

        let agent_id = match target {
            FulfillmentState::Assigned => Some(agent_id.ok_or(OrderError::AgentRequired)?),
            _ => None,
        };

        let mut events = vec![OrderEvent::fulfillment_changed(
            self.fulfillment_state,
            target,
            actor.clone(),
            agent_id,
            reason,
            self.next_status_timestamp(),
        )];

        if target == FulfillmentState::Delivered
            && self.payment_method == PaymentMethod::CashOnDelivery
            && self.payment_state.can_settle()
        {
            events.push(OrderEvent::payment_confirmed(
                self.cash_on_delivery_transaction_id(),
                self.final_amount(),
            ));
        }

        Ok(events)
    }

    /// Like [`Order::transition`], but a no-op when already in `target`.
    ///
    /// Used by the coordinator when a step is re-run after a partial failure.
    pub fn ensure_fulfillment(
        &self,
        target: FulfillmentState,
        actor: &Actor,
        agent_id: Option<AgentId>,
        reason: Option<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let same_agent = agent_id.is_none() || agent_id == self.agent_id;
        if self.is_placed() && self.fulfillment_state == target && same_agent {
            return Ok(vec![]);
        }
        self.transition(target, actor, agent_id, reason)
    }

    /// Records a successful payment. Replaying the same transaction is a no-op.
    pub fn confirm_payment(&self, transaction_id: &str) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;
        if transaction_id.trim().is_empty() {
            return Err(OrderError::MissingTransactionId);
        }

        match self.payment_state {
            PaymentState::Pending => Ok(vec![OrderEvent::payment_confirmed(
                transaction_id,
                self.final_amount(),
            )]),
            PaymentState::Paid if self.payment_transaction_id.as_deref() == Some(transaction_id) => {
                Ok(vec![])
            }
            PaymentState::Paid => Err(OrderError::PaymentAlreadySettled {
                transaction_id: self.payment_transaction_id.clone().unwrap_or_default(),
            }),
            current => Err(OrderError::InvalidPaymentTransition {
                current,
                action: "confirm payment",
            }),
        }
    }

    /// Records a declined payment. Replaying the same transaction is a no-op.
    pub fn decline_payment(
        &self,
        transaction_id: &str,
        reason: impl Into<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;
        if transaction_id.trim().is_empty() {
            return Err(OrderError::MissingTransactionId);
        }

        match self.payment_state {
            PaymentState::Pending => Ok(vec![OrderEvent::payment_declined(transaction_id, reason)]),
            PaymentState::Failed
                if self.payment_transaction_id.as_deref() == Some(transaction_id) =>
            {
                Ok(vec![])
            }
            current => Err(OrderError::InvalidPaymentTransition {
                current,
                action: "decline payment",
            }),
        }
    }

    /// Opens a return request on a delivered order.
    pub fn request_return(
        &self,
        reason: &str,
        actor: &Actor,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;

        if !self.is_buyer(actor) && !actor.is_privileged() {
            return Err(OrderError::forbidden(actor, "request return"));
        }

        if self.fulfillment_state != FulfillmentState::Delivered {
            return Err(OrderError::NotReturnable {
                state: self.fulfillment_state,
            });
        }

        if self.return_request.is_some() {
            return Err(OrderError::ReturnAlreadyRequested);
        }

        if reason.trim().is_empty() {
            return Err(OrderError::EmptyReason);
        }

        Ok(vec![OrderEvent::return_requested(reason, actor.clone())])
    }

    /// Approves or rejects the pending return.
    ///
    /// Resolving twice with the same decision is a no-op; a different
    /// decision is rejected.
    pub fn resolve_return(
        &self,
        decision: ReturnDecision,
        refund_amount: Option<Money>,
        actor: &Actor,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;

        if !self.is_vendor(actor) && !actor.is_privileged() {
            return Err(OrderError::forbidden(actor, "process return"));
        }

        let request = self
            .return_request
            .as_ref()
            .ok_or(OrderError::NoReturnRequest)?;

        if let Some(recorded) = request.decision {
            return if recorded == decision {
                Ok(vec![])
            } else {
                Err(OrderError::ReturnAlreadyResolved { decision: recorded })
            };
        }

        let refund_amount = match decision {
            ReturnDecision::Rejected => None,
            ReturnDecision::Approved => {
                if !self.payment_state.can_refund() {
                    return Err(OrderError::NotRefundable {
                        payment_state: self.payment_state,
                    });
                }
                let amount = refund_amount.ok_or(OrderError::RefundAmountRequired)?;
                if !amount.is_positive() || amount > self.final_amount() {
                    return Err(OrderError::InvalidRefundAmount {
                        amount: amount.cents(),
                        max: self.final_amount().cents(),
                    });
                }
                Some(amount)
            }
        };

        Ok(vec![OrderEvent::return_resolved(
            decision,
            refund_amount,
            actor.clone(),
        )])
    }

    /// Records that the approved refund was credited to the buyer.
    pub fn mark_refunded(&self, ledger_key: &str) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;

        let request = self
            .return_request
            .as_ref()
            .ok_or(OrderError::NoReturnRequest)?;

        match request.state {
            ReturnState::Refunded => Ok(vec![]),
            ReturnState::Approved => {
                if !self.payment_state.can_refund() {
                    return Err(OrderError::NotRefundable {
                        payment_state: self.payment_state,
                    });
                }
                let amount = request
                    .refund_amount
                    .ok_or(OrderError::RefundAmountRequired)?;
                Ok(vec![OrderEvent::order_refunded(amount, ledger_key)])
            }
            state => Err(OrderError::ReturnNotApproved { state }),
        }
    }
}

// Helpers
impl Order {
    fn ensure_placed(&self) -> Result<(), OrderError> {
        if self.id.is_none() {
            return Err(OrderError::NotPlaced);
        }
        Ok(())
    }

    /// A timestamp strictly after the last status change.
    fn next_status_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.status_history.last() {
            Some(last) if now <= last.at => last.at + Duration::microseconds(1),
            _ => now,
        }
    }

    pub fn cash_on_delivery_transaction_id(&self) -> String {
        format!("cod:{}", self.id.unwrap_or_default())
    }
}

// Apply event helpers
impl Order {
    fn apply_placed(&mut self, data: OrderPlacedData) {
        self.id = Some(data.order_id);
        self.buyer_id = Some(data.buyer_id);
        self.vendor_id = Some(data.vendor_id);
        self.line_items = data.line_items;
        self.address = data.address;
        self.coupon_code = data.coupon_code;
        self.payment_method = data.payment_method;
        self.total_amount = data.total_amount;
        self.discount_amount = data.discount_amount;
        self.fulfillment_state = FulfillmentState::InProgress;
        self.payment_state = PaymentState::Pending;
        self.placed_at = Some(data.placed_at);
        self.status_history.push(StatusChange {
            state: FulfillmentState::InProgress,
            at: data.placed_at,
            actor: data.placed_by,
        });
    }

    fn apply_fulfillment_changed(&mut self, data: FulfillmentChangedData) {
        self.fulfillment_state = data.to;
        if let Some(agent_id) = data.agent_id {
            self.agent_id = Some(agent_id);
        }
        self.status_history.push(StatusChange {
            state: data.to,
            at: data.changed_at,
            actor: data.actor,
        });
    }

    fn apply_return_resolved(&mut self, data: ReturnResolvedData) {
        if let Some(request) = self.return_request.as_mut() {
            request.state = match data.decision {
                ReturnDecision::Approved => ReturnState::Approved,
                ReturnDecision::Rejected => ReturnState::Rejected,
            };
            request.decision = Some(data.decision);
            request.refund_amount = data.refund_amount;
            request.resolved_by = Some(data.resolved_by);
            request.resolved_at = Some(data.resolved_at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place_cmd(buyer: BuyerId, vendor: VendorId, method: PaymentMethod) -> PlaceOrder {
        PlaceOrder::new(
            AggregateId::new(),
            buyer,
            vendor,
            vec![
                LineItem::new("SKU-1", "Lamp", Money::from_cents(4000), 2),
                LineItem::new("SKU-2", "Bulb", Money::from_cents(2000), 1),
            ],
            DeliveryAddress::new("1 Main St", "Accra", "GH"),
        )
        .with_payment_method(method)
    }

    fn placed(method: PaymentMethod, discount: i64) -> Order {
        let buyer = BuyerId::new();
        let cmd = place_cmd(buyer, VendorId::new(), method);
        let mut order = Order::default();
        let events = order
            .place(&cmd, Money::from_cents(discount), &Actor::Buyer(buyer))
            .unwrap();
        order.apply_events(events);
        order
    }

    fn system() -> Actor {
        Actor::system("test")
    }

    fn run(order: &mut Order, events: Result<Vec<OrderEvent>, OrderError>) {
        order.apply_events(events.unwrap());
    }

    fn delivered(method: PaymentMethod) -> Order {
        let mut order = placed(method, 0);
        let agent = AgentId::new();
        let events = order.transition(FulfillmentState::Assigned, &system(), Some(agent), None);
        run(&mut order, events);
        let events = order.transition(FulfillmentState::Delivered, &system(), None, None);
        run(&mut order, events);
        order
    }

    #[test]
    fn test_place_computes_amounts() {
        let order = placed(PaymentMethod::Card, 1000);
        assert_eq!(order.total_amount().cents(), 10_000);
        assert_eq!(order.discount_amount().cents(), 1000);
        assert_eq!(order.final_amount().cents(), 9000);
        assert_eq!(order.fulfillment_state(), FulfillmentState::InProgress);
        assert_eq!(order.payment_state(), PaymentState::Pending);
        assert_eq!(order.status_history().len(), 1);
    }

    #[test]
    fn test_place_rejects_discount_above_total() {
        let buyer = BuyerId::new();
        let cmd = place_cmd(buyer, VendorId::new(), PaymentMethod::Card);
        let result = Order::default().place(&cmd, Money::from_cents(10_001), &Actor::Buyer(buyer));
        assert!(matches!(result, Err(OrderError::InvalidDiscount { .. })));
    }

    #[test]
    fn test_place_rejects_total_overflow() {
        let buyer = BuyerId::new();
        let actor = Actor::Buyer(buyer);
        let address = DeliveryAddress::new("1 Main St", "Accra", "GH");

        let huge_line = PlaceOrder::new(
            AggregateId::new(),
            buyer,
            VendorId::new(),
            vec![LineItem::new("SKU-1", "Lamp", Money::from_cents(i64::MAX / 2 + 1), 2)],
            address.clone(),
        );
        assert!(matches!(
            Order::default().place(&huge_line, Money::zero(), &actor),
            Err(OrderError::TotalTooLarge)
        ));

        let huge_sum = PlaceOrder::new(
            AggregateId::new(),
            buyer,
            VendorId::new(),
            vec![
                LineItem::new("SKU-1", "Lamp", Money::from_cents(i64::MAX), 1),
                LineItem::new("SKU-2", "Bulb", Money::from_cents(1), 1),
            ],
            address,
        );
        let err = Order::default()
            .place(&huge_sum, Money::zero(), &actor)
            .unwrap_err();
        assert!(matches!(err, OrderError::TotalTooLarge));
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[test]
    fn test_place_rejects_other_buyer() {
        let cmd = place_cmd(BuyerId::new(), VendorId::new(), PaymentMethod::Card);
        let result = Order::default().place(&cmd, Money::zero(), &Actor::Buyer(BuyerId::new()));
        assert!(matches!(result, Err(OrderError::Forbidden { .. })));
    }

    #[test]
    fn test_place_validates_items_and_address() {
        let buyer = BuyerId::new();
        let actor = Actor::Buyer(buyer);

        let mut cmd = place_cmd(buyer, VendorId::new(), PaymentMethod::Card);
        cmd.line_items.clear();
        assert!(matches!(
            Order::default().place(&cmd, Money::zero(), &actor),
            Err(OrderError::NoItems)
        ));

        let mut cmd = place_cmd(buyer, VendorId::new(), PaymentMethod::Card);
        cmd.line_items[0].quantity = 0;
        assert!(matches!(
            Order::default().place(&cmd, Money::zero(), &actor),
            Err(OrderError::InvalidQuantity { .. })
        ));

        let mut cmd = place_cmd(buyer, VendorId::new(), PaymentMethod::Card);
        cmd.address.street.clear();
        assert!(matches!(
            Order::default().place(&cmd, Money::zero(), &actor),
            Err(OrderError::InvalidAddress("street"))
        ));
    }

    #[test]
    fn test_place_twice_fails() {
        let order = placed(PaymentMethod::Card, 0);
        let cmd = place_cmd(order.buyer_id().unwrap(), VendorId::new(), PaymentMethod::Card);
        assert!(matches!(
            order.place(&cmd, Money::zero(), &system()),
            Err(OrderError::AlreadyPlaced)
        ));
    }

    #[test]
    fn test_forward_transitions_record_history() {
        let order = delivered(PaymentMethod::Card);
        assert_eq!(order.fulfillment_state(), FulfillmentState::Delivered);
        assert!(order.agent_id().is_some());

        let states: Vec<_> = order.status_history().iter().map(|s| s.state).collect();
        assert_eq!(
            states,
            vec![
                FulfillmentState::InProgress,
                FulfillmentState::Assigned,
                FulfillmentState::Delivered
            ]
        );
        assert!(
            order
                .status_history()
                .windows(2)
                .all(|pair| pair[0].at < pair[1].at)
        );
    }

    #[test]
    fn test_delivered_cannot_go_back() {
        let order = delivered(PaymentMethod::Card);
        let result = order.transition(FulfillmentState::Assigned, &system(), Some(AgentId::new()), None);
        assert!(matches!(
            result,
            Err(OrderError::InvalidTransition {
                from: FulfillmentState::Delivered,
                to: FulfillmentState::Assigned
            })
        ));
        assert!(order.transition(FulfillmentState::Canceled, &system(), None, None).is_err());
    }

    #[test]
    fn test_assign_requires_agent() {
        let order = placed(PaymentMethod::Card, 0);
        assert!(matches!(
            order.transition(FulfillmentState::Assigned, &system(), None, None),
            Err(OrderError::AgentRequired)
        ));
    }

    #[test]
    fn test_buyer_may_only_cancel() {
        let order = placed(PaymentMethod::Card, 0);
        let buyer = Actor::Buyer(order.buyer_id().unwrap());

        assert!(matches!(
            order.transition(FulfillmentState::Assigned, &buyer, Some(AgentId::new()), None),
            Err(OrderError::Forbidden { .. })
        ));
        let events = order
            .transition(FulfillmentState::Canceled, &buyer, None, Some("changed mind".into()))
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_unrelated_vendor_is_forbidden() {
        let order = placed(PaymentMethod::Card, 0);
        let result = order.transition(
            FulfillmentState::Canceled,
            &Actor::Vendor(VendorId::new()),
            None,
            None,
        );
        assert!(matches!(result, Err(OrderError::Forbidden { .. })));
    }

    #[test]
    fn test_ensure_fulfillment_is_idempotent() {
        let order = delivered(PaymentMethod::Card);
        let events = order
            .ensure_fulfillment(FulfillmentState::Delivered, &system(), None, None)
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_cash_on_delivery_is_paid_on_delivery() {
        let order = delivered(PaymentMethod::CashOnDelivery);
        assert_eq!(order.payment_state(), PaymentState::Paid);
        assert_eq!(
            order.payment_transaction_id(),
            Some(order.cash_on_delivery_transaction_id().as_str())
        );
    }

    #[test]
    fn test_confirm_payment_is_idempotent_by_transaction() {
        let mut order = placed(PaymentMethod::Card, 0);
        let events = order.confirm_payment("gw-1");
        run(&mut order, events);
        assert_eq!(order.payment_state(), PaymentState::Paid);

        assert!(order.confirm_payment("gw-1").unwrap().is_empty());
        assert!(matches!(
            order.confirm_payment("gw-2"),
            Err(OrderError::PaymentAlreadySettled { .. })
        ));
    }

    #[test]
    fn test_declined_payment_cannot_be_confirmed() {
        let mut order = placed(PaymentMethod::Card, 0);
        let events = order.decline_payment("gw-1", "card expired");
        run(&mut order, events);
        assert_eq!(order.payment_state(), PaymentState::Failed);
        assert!(order.decline_payment("gw-1", "again").unwrap().is_empty());
        assert!(matches!(
            order.confirm_payment("gw-1"),
            Err(OrderError::InvalidPaymentTransition { .. })
        ));
    }

    #[test]
    fn test_return_requires_delivery() {
        let order = placed(PaymentMethod::Card, 0);
        let buyer = Actor::Buyer(order.buyer_id().unwrap());
        assert!(matches!(
            order.request_return("broken", &buyer),
            Err(OrderError::NotReturnable { .. })
        ));
    }

    #[test]
    fn test_return_approval_flow() {
        let mut order = delivered(PaymentMethod::CashOnDelivery);
        let buyer = Actor::Buyer(order.buyer_id().unwrap());
        let vendor = Actor::Vendor(order.vendor_id().unwrap());

        let events = order.request_return("broken", &buyer);
        run(&mut order, events);
        assert!(matches!(
            order.request_return("again", &buyer),
            Err(OrderError::ReturnAlreadyRequested)
        ));

        let events = order.resolve_return(ReturnDecision::Approved, Some(Money::from_cents(9000)), &vendor);
        run(&mut order, events);
        assert_eq!(order.return_request().unwrap().state, ReturnState::Approved);

        // Same decision again changes nothing; a different one is refused.
        assert!(
            order
                .resolve_return(ReturnDecision::Approved, Some(Money::from_cents(9000)), &vendor)
                .unwrap()
                .is_empty()
        );
        assert!(matches!(
            order.resolve_return(ReturnDecision::Rejected, None, &vendor),
            Err(OrderError::ReturnAlreadyResolved { .. })
        ));

        let events = order.mark_refunded("refund:x");
        run(&mut order, events);
        assert_eq!(order.payment_state(), PaymentState::Refunded);
        assert_eq!(order.return_request().unwrap().state, ReturnState::Refunded);
        assert!(order.mark_refunded("refund:x").unwrap().is_empty());
    }

    #[test]
    fn test_refund_amount_is_bounded() {
        let mut order = delivered(PaymentMethod::CashOnDelivery);
        let buyer = Actor::Buyer(order.buyer_id().unwrap());
        let events = order.request_return("broken", &buyer);
        run(&mut order, events);

        let too_much = Money::from_cents(order.final_amount().cents() + 1);
        assert!(matches!(
            order.resolve_return(ReturnDecision::Approved, Some(too_much), &system()),
            Err(OrderError::InvalidRefundAmount { .. })
        ));
        assert!(matches!(
            order.resolve_return(ReturnDecision::Approved, None, &system()),
            Err(OrderError::RefundAmountRequired)
        ));
    }

    #[test]
    fn test_unpaid_order_cannot_be_refunded() {
        let mut order = delivered(PaymentMethod::Card);
        let buyer = Actor::Buyer(order.buyer_id().unwrap());
        let events = order.request_return("broken", &buyer);
        run(&mut order, events);

        assert!(matches!(
            order.resolve_return(ReturnDecision::Approved, Some(Money::from_cents(100)), &system()),
            Err(OrderError::NotRefundable {
                payment_state: PaymentState::Pending
            })
        ));
    }

    #[test]
    fn test_rejection_leaves_payment_unchanged() {
        let mut order = delivered(PaymentMethod::CashOnDelivery);
        let buyer = Actor::Buyer(order.buyer_id().unwrap());
        let events = order.request_return("broken", &buyer);
        run(&mut order, events);
        let events = order.resolve_return(ReturnDecision::Rejected, None, &system());
        run(&mut order, events);

        assert_eq!(order.payment_state(), PaymentState::Paid);
        assert_eq!(order.return_request().unwrap().state, ReturnState::Rejected);
        assert!(matches!(
            order.mark_refunded("refund:x"),
            Err(OrderError::ReturnNotApproved { .. })
        ));
    }

    #[test]
    fn test_unplaced_order_rejects_commands() {
        let order = Order::default();
        assert!(matches!(
            order.transition(FulfillmentState::Canceled, &system(), None, None),
            Err(OrderError::NotPlaced)
        ));
        assert!(matches!(order.confirm_payment("x"), Err(OrderError::NotPlaced)));
    }

    #[test]
    fn test_snapshot_round_trip_preserves_state() {
        let order = delivered(PaymentMethod::CashOnDelivery);
        let json = serde_json::to_value(&order).unwrap();
        let restored: Order = serde_json::from_value(json).unwrap();
        assert_eq!(restored.fulfillment_state(), FulfillmentState::Delivered);
        assert_eq!(restored.status_history(), order.status_history());
        assert_eq!(restored.final_amount(), order.final_amount());
    }
}

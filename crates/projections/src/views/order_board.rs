//! Order board: one row per order with its three current states.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Actor, AgentId, AggregateId, BuyerId, VendorId};
use domain::{
    Aggregate, FulfillmentState, Money, Order, OrderEvent, PaymentMethod, PaymentState,
    ReturnDecision, ReturnState,
};
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub order_id: AggregateId,
    pub buyer_id: BuyerId,
    pub vendor_id: VendorId,
    pub agent_id: Option<AgentId>,
    pub fulfillment_state: FulfillmentState,
    pub payment_state: PaymentState,
    pub payment_method: PaymentMethod,
    pub return_state: Option<ReturnState>,
    pub total_amount: Money,
    pub discount_amount: Money,
    pub final_amount: Money,
    pub coupon_code: Option<String>,
    pub placed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderSummary {
    /// Same visibility rule as the order itself.
    pub fn is_visible_to(&self, actor: &Actor) -> bool {
        match actor {
            Actor::Buyer(id) => *id == self.buyer_id,
            Actor::Vendor(id) => *id == self.vendor_id,
            Actor::Agent(id) => Some(*id) == self.agent_id,
            Actor::Admin(_) | Actor::System(_) => true,
        }
    }
}

/// Orders by buyer, vendor and agent.
///
/// Rows are never removed; canceled and delivered orders stay on the board.
#[derive(Clone, Default)]
pub struct OrderBoardView {
    orders: Arc<RwLock<HashMap<AggregateId, OrderSummary>>>,
    position: Arc<RwLock<ProjectionPosition>>,
}

impl OrderBoardView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, order_id: AggregateId) -> Option<OrderSummary> {
        self.orders.read().await.get(&order_id).cloned()
    }

    /// All rows, newest first.
    pub async fn all(&self) -> Vec<OrderSummary> {
        self.select(|_| true).await
    }

    pub async fn for_buyer(&self, buyer_id: BuyerId) -> Vec<OrderSummary> {
        self.select(|o| o.buyer_id == buyer_id).await
    }

    pub async fn for_vendor(&self, vendor_id: VendorId) -> Vec<OrderSummary> {
        self.select(|o| o.vendor_id == vendor_id).await
    }

    pub async fn for_agent(&self, agent_id: AgentId) -> Vec<OrderSummary> {
        self.select(|o| o.agent_id == Some(agent_id)).await
    }

    pub async fn by_state(&self, state: FulfillmentState) -> Vec<OrderSummary> {
        self.select(|o| o.fulfillment_state == state).await
    }

    /// The rows `actor` may read.
    pub async fn visible_to(&self, actor: &Actor) -> Vec<OrderSummary> {
        self.select(|o| o.is_visible_to(actor)).await
    }

    async fn select(&self, keep: impl Fn(&OrderSummary) -> bool) -> Vec<OrderSummary> {
        let mut rows: Vec<_> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| keep(o))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
        rows
    }

    async fn advance(&self) {
        let mut pos = self.position.write().await;
        *pos = pos.advance();
    }
}

fn apply(
    orders: &mut HashMap<AggregateId, OrderSummary>,
    order_id: AggregateId,
    event: OrderEvent,
    at: DateTime<Utc>,
) {
    if let OrderEvent::OrderPlaced(data) = event {
        let discount = data.discount_amount.clamp_to(data.total_amount);
        orders.insert(
            order_id,
            OrderSummary {
                order_id,
                buyer_id: data.buyer_id,
                vendor_id: data.vendor_id,
                agent_id: None,
                fulfillment_state: FulfillmentState::InProgress,
                payment_state: PaymentState::Pending,
                payment_method: data.payment_method,
                return_state: None,
                total_amount: data.total_amount,
                discount_amount: discount,
                final_amount: data.total_amount - discount,
                coupon_code: data.coupon_code,
                placed_at: data.placed_at,
                updated_at: data.placed_at,
            },
        );
        return;
    }

    let Some(row) = orders.get_mut(&order_id) else {
        tracing::warn!(%order_id, "order board saw an event before the order was placed");
        return;
    };
    row.updated_at = at;
    match event {
        OrderEvent::OrderPlaced(_) => {}
        OrderEvent::FulfillmentChanged(data) => {
            row.fulfillment_state = data.to;
            if data.agent_id.is_some() {
                row.agent_id = data.agent_id;
            }
            row.updated_at = data.changed_at;
        }
        OrderEvent::PaymentConfirmed(_) => row.payment_state = PaymentState::Paid,
        OrderEvent::PaymentDeclined(_) => row.payment_state = PaymentState::Failed,
        OrderEvent::ReturnRequested(_) => row.return_state = Some(ReturnState::Pending),
        OrderEvent::ReturnResolved(data) => {
            row.return_state = Some(match data.decision {
                ReturnDecision::Approved => ReturnState::Approved,
                ReturnDecision::Rejected => ReturnState::Rejected,
            });
        }
        OrderEvent::OrderRefunded(_) => {
            row.payment_state = PaymentState::Refunded;
            row.return_state = Some(ReturnState::Refunded);
        }
    }
}

#[async_trait]
impl Projection for OrderBoardView {
    fn name(&self) -> &'static str {
        "OrderBoardView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        if event.aggregate_type == Order::aggregate_type() {
            let order_event: OrderEvent = event.decode()?;
            let mut orders = self.orders.write().await;
            apply(&mut orders, event.aggregate_id, order_event, event.timestamp);
        }
        self.advance().await;
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        *self.position.read().await
    }

    async fn reset(&self) -> Result<()> {
        self.orders.write().await.clear();
        *self.position.write().await = ProjectionPosition::zero();
        Ok(())
    }
}

#[async_trait]
impl ReadModel for OrderBoardView {
    fn name(&self) -> &'static str {
        "OrderBoardView"
    }

    async fn count(&self) -> usize {
        self.orders.read().await.len()
    }
}

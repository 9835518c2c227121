use common::AggregateId;
use event_store::EventStore;

use crate::aggregate::Aggregate;
use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;
use crate::locks::AggregateLocks;
use crate::order::Order;

use super::{CommissionEntry, CommissionError, CommissionRate};

pub struct CommissionService<S: EventStore> {
    handler: CommandHandler<S, CommissionEntry>,
    rate: CommissionRate,
}

impl<S: EventStore + Clone> Clone for CommissionService<S> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            rate: self.rate,
        }
    }
}

impl<S: EventStore> CommissionService<S> {
    pub fn new(store: S, rate: CommissionRate) -> Self {
        Self::with_locks(store, AggregateLocks::new(), rate)
    }

    pub fn with_locks(store: S, locks: AggregateLocks, rate: CommissionRate) -> Self {
        Self {
            handler: CommandHandler::with_locks(store, locks),
            rate,
        }
    }

    pub fn rate(&self) -> CommissionRate {
        self.rate
    }

    /// Records the commission for a delivered order, at most once per order.
    #[tracing::instrument(skip(self, order), fields(order_id = ?order.id(), rate = %self.rate))]
    pub async fn settle(
        &self,
        order: &Order,
    ) -> Result<CommandResult<CommissionEntry>, DomainError> {
        let order_id = order.id().ok_or(CommissionError::NotDeliverable {
            state: order.fulfillment_state(),
        })?;
        let rate = self.rate;

        let result = self
            .handler
            .execute(CommissionEntry::id_for(order_id), |entry| {
                entry.record(order, rate)
            })
            .await?;

        if !result.is_noop() {
            metrics::counter!("commissions_settled_total").increment(1);
            tracing::info!(amount = %result.aggregate.amount(), "commission recorded");
        }
        Ok(result)
    }

    pub async fn mark_paid(
        &self,
        order_id: AggregateId,
        ledger_key: &str,
    ) -> Result<CommandResult<CommissionEntry>, DomainError> {
        self.handler
            .execute(CommissionEntry::id_for(order_id), |entry| {
                entry.mark_paid(ledger_key)
            })
            .await
    }

    pub async fn mark_failed(
        &self,
        order_id: AggregateId,
        reason: &str,
    ) -> Result<CommandResult<CommissionEntry>, DomainError> {
        self.handler
            .execute(CommissionEntry::id_for(order_id), |entry| {
                entry.mark_failed(reason)
            })
            .await
    }

    pub async fn get_commission(
        &self,
        order_id: AggregateId,
    ) -> Result<Option<CommissionEntry>, DomainError> {
        self.handler
            .load_existing(CommissionEntry::id_for(order_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::money::Money;
    use crate::order::{
        DeliveryAddress, FulfillmentState, LineItem, OrderService, PlaceOrder, TransitionOrder,
    };
    use common::{Actor, AgentId, BuyerId, VendorId};
    use event_store::InMemoryEventStore;

    async fn delivered(store: &InMemoryEventStore) -> Order {
        let orders = OrderService::new(store.clone());
        let buyer = BuyerId::new();
        let order_id = AggregateId::new();
        let system = Actor::system("test");

        orders
            .place_order(
                PlaceOrder::new(
                    order_id,
                    buyer,
                    VendorId::new(),
                    vec![LineItem::new("SKU-1", "Bike", Money::from_cents(20_000), 1)],
                    DeliveryAddress::new("1 Main St", "Harare", "ZW"),
                ),
                Money::zero(),
                &Actor::Buyer(buyer),
            )
            .await
            .unwrap();
        orders
            .transition(
                TransitionOrder::new(order_id, FulfillmentState::Assigned, system.clone())
                    .with_agent(AgentId::new()),
            )
            .await
            .unwrap();
        orders
            .transition(TransitionOrder::new(order_id, FulfillmentState::Delivered, system))
            .await
            .unwrap()
            .aggregate
    }

    #[tokio::test]
    async fn test_settle_twice_creates_one_entry() {
        let store = InMemoryEventStore::new();
        let service = CommissionService::new(store.clone(), CommissionRate::default());
        let order = delivered(&store).await;

        let first = service.settle(&order).await.unwrap();
        let second = service.settle(&order).await.unwrap();

        assert!(!first.is_noop());
        assert!(second.is_noop());
        assert_eq!(second.aggregate.amount().cents(), 2000);
        assert_eq!(first.new_version, second.new_version);
    }

    #[tokio::test]
    async fn test_configured_rate() {
        let store = InMemoryEventStore::new();
        let rate = CommissionRate::from_bps(750).unwrap();
        let service = CommissionService::new(store.clone(), rate);
        let order = delivered(&store).await;

        let result = service.settle(&order).await.unwrap();
        assert_eq!(result.aggregate.amount().cents(), 1500);
        assert_eq!(result.aggregate.rate(), Some(rate));
    }

    #[tokio::test]
    async fn test_mark_paid_without_entry() {
        let service = CommissionService::new(InMemoryEventStore::new(), CommissionRate::default());
        let err = service.mark_paid(AggregateId::new(), "k").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

//! Order service providing a simplified API for order operations.

use common::{Actor, AgentId, AggregateId};
use event_store::EventStore;

use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;
use crate::locks::AggregateLocks;
use crate::money::Money;

use super::{FulfillmentState, Order, PlaceOrder, ProcessReturn, RequestReturn, TransitionOrder};

/// Service for managing orders.
///
/// Every mutation goes through the command handler, so commands on one
/// order are applied one at a time and each lands as a versioned append.
pub struct OrderService<S: EventStore> {
    handler: CommandHandler<S, Order>,
}

impl<S: EventStore + Clone> Clone for OrderService<S> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<S: EventStore> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    pub fn with_locks(store: S, locks: AggregateLocks) -> Self {
        Self {
            handler: CommandHandler::with_locks(store, locks),
        }
    }

    pub fn handler(&self) -> &CommandHandler<S, Order> {
        &self.handler
    }

    /// Places an order with an already validated discount.
    #[tracing::instrument(skip(self, cmd, actor), fields(order_id = %cmd.order_id, actor = %actor))]
    pub async fn place_order(
        &self,
        cmd: PlaceOrder,
        discount: Money,
        actor: &Actor,
    ) -> Result<CommandResult<Order>, DomainError> {
        let result = self
            .handler
            .execute_with_snapshot(cmd.order_id, |order| order.place(&cmd, discount, actor))
            .await?;

        metrics::counter!("orders_placed_total").increment(1);
        tracing::info!(
            final_amount = %result.aggregate.final_amount(),
            "order placed"
        );
        Ok(result)
    }

    /// Moves an order to a new fulfillment state.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, target = %cmd.target))]
    pub async fn transition(
        &self,
        cmd: TransitionOrder,
    ) -> Result<CommandResult<Order>, DomainError> {
        let TransitionOrder {
            order_id,
            target,
            actor,
            agent_id,
            reason,
        } = cmd;

        let result = self
            .handler
            .execute_with_snapshot(order_id, |order| {
                order.transition(target, &actor, agent_id, reason)
            })
            .await?;

        metrics::counter!("order_transitions_total", "target" => target.as_str()).increment(1);
        Ok(result)
    }

    /// Idempotent transition used when a step may be re-run.
    #[tracing::instrument(skip(self, actor, reason))]
    pub async fn ensure_fulfillment(
        &self,
        order_id: AggregateId,
        target: FulfillmentState,
        actor: &Actor,
        agent_id: Option<AgentId>,
        reason: Option<String>,
    ) -> Result<CommandResult<Order>, DomainError> {
        let result = self
            .handler
            .execute_with_snapshot(order_id, |order| {
                order.ensure_fulfillment(target, actor, agent_id, reason)
            })
            .await?;

        if !result.is_noop() {
            metrics::counter!("order_transitions_total", "target" => target.as_str())
                .increment(1);
        }
        Ok(result)
    }

    /// Records the gateway's approval of a payment.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_payment(
        &self,
        order_id: AggregateId,
        transaction_id: &str,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute_with_snapshot(order_id, |order| order.confirm_payment(transaction_id))
            .await
    }

    /// Records the gateway's refusal of a payment.
    #[tracing::instrument(skip(self))]
    pub async fn decline_payment(
        &self,
        order_id: AggregateId,
        transaction_id: &str,
        reason: &str,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute_with_snapshot(order_id, |order| {
                order.decline_payment(transaction_id, reason)
            })
            .await
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn request_return(
        &self,
        cmd: RequestReturn,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute_with_snapshot(cmd.order_id, |order| {
                order.request_return(&cmd.reason, &cmd.actor)
            })
            .await
    }

    /// Resolves a return request. A replay with the same decision is a no-op.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, decision = %cmd.decision))]
    pub async fn process_return(
        &self,
        cmd: ProcessReturn,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute_with_snapshot(cmd.order_id, |order| {
                order.resolve_return(cmd.decision, cmd.refund_amount, &cmd.actor)
            })
            .await
    }

    /// Marks the refund of an approved return as paid out.
    #[tracing::instrument(skip(self))]
    pub async fn mark_refunded(
        &self,
        order_id: AggregateId,
        ledger_key: &str,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute_with_snapshot(order_id, |order| order.mark_refunded(ledger_key))
            .await
    }

    /// Loads an order by ID.
    ///
    /// Returns None if the order doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Option<Order>, DomainError> {
        self.handler.load_existing(order_id).await
    }

    /// Loads an order, failing with not-found if it was never placed.
    pub async fn require_order(&self, order_id: AggregateId) -> Result<Order, DomainError> {
        self.get_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", order_id))
    }
}

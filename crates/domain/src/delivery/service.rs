use common::{Actor, AgentId, AggregateId};
use event_store::EventStore;

use crate::aggregate::Aggregate;
use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;
use crate::locks::AggregateLocks;
use crate::order::Order;

use super::{AssignmentState, DeliveryAssignment, DeliveryError, DeliveryEstimate};

/// Records delivery assignments. Moving the order itself is left to the
/// settlement coordinator.
pub struct DeliveryService<S: EventStore> {
    handler: CommandHandler<S, DeliveryAssignment>,
}

impl<S: EventStore + Clone> Clone for DeliveryService<S> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<S: EventStore> DeliveryService<S> {
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

    #[tracing::instrument(skip(self, order), fields(order_id = ?order.id()))]
    pub async fn assign(
        &self,
        order: &Order,
        agent_id: AgentId,
        estimate: DeliveryEstimate,
    ) -> Result<CommandResult<DeliveryAssignment>, DomainError> {
        let order_id = order.id().ok_or(DeliveryError::OrderNotPlaced)?;

        self.handler
            .execute(DeliveryAssignment::id_for(order_id), |assignment| {
                assignment.assign(order, agent_id, estimate)
            })
            .await
    }

    #[tracing::instrument(skip(self, actor, reason))]
    pub async fn advance(
        &self,
        assignment_id: AggregateId,
        target: AssignmentState,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<CommandResult<DeliveryAssignment>, DomainError> {
        let result = self
            .handler
            .execute(assignment_id, |assignment| {
                assignment.advance(target, actor, reason)
            })
            .await?;

        if !result.is_noop() {
            metrics::counter!("delivery_transitions_total", "target" => target.as_str())
                .increment(1);
        }
        Ok(result)
    }

    pub async fn get_assignment(
        &self,
        assignment_id: AggregateId,
    ) -> Result<Option<DeliveryAssignment>, DomainError> {
        self.handler.load_existing(assignment_id).await
    }

    pub async fn require_assignment(
        &self,
        assignment_id: AggregateId,
    ) -> Result<DeliveryAssignment, DomainError> {
        self.get_assignment(assignment_id)
            .await?
            .ok_or_else(|| DeliveryError::NotFound.into())
    }

    pub async fn assignment_for_order(
        &self,
        order_id: AggregateId,
    ) -> Result<Option<DeliveryAssignment>, DomainError> {
        self.get_assignment(DeliveryAssignment::id_for(order_id))
            .await
    }
}

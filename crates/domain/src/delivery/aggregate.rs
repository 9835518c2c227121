//! Delivery assignment aggregate.

use chrono::{DateTime, Utc};
use common::{Actor, AgentId, AggregateId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::order::{FulfillmentState, Order};

use super::events::AssignmentCreatedData;
use super::{AssignmentState, DeliveryError, DeliveryEstimate, DeliveryEvent};

/// The delivery of one order by one agent.
///
/// The id is derived from the order id, so an order has at most one
/// assignment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryAssignment {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    order_id: Option<AggregateId>,
    agent_id: Option<AgentId>,
    state: AssignmentState,
    estimate: DeliveryEstimate,

    assigned_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
}

impl Aggregate for DeliveryAssignment {
    type Event = DeliveryEvent;
    type Error = DeliveryError;

    fn aggregate_type() -> &'static str {
        "DeliveryAssignment"
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
            DeliveryEvent::AssignmentCreated(data) => {
                self.id = Some(data.assignment_id);
                self.order_id = Some(data.order_id);
                self.agent_id = Some(data.agent_id);
                self.estimate = data.estimate;
                self.state = AssignmentState::Assigned;
                self.assigned_at = Some(data.assigned_at);
            }
            DeliveryEvent::AssignmentStarted { started_at, .. } => {
                self.state = AssignmentState::InProgress;
                self.started_at = Some(started_at);
            }
            DeliveryEvent::AssignmentCompleted { completed_at, .. } => {
                self.state = AssignmentState::Completed;
                self.completed_at = Some(completed_at);
            }
            DeliveryEvent::AssignmentCancelled {
                reason,
                cancelled_at,
                ..
            } => {
                self.state = AssignmentState::Cancelled;
                self.cancelled_at = Some(cancelled_at);
                self.cancel_reason = reason;
            }
        }
    }
}

impl SnapshotCapable for DeliveryAssignment {}

impl DeliveryAssignment {
    pub fn id_for(order_id: AggregateId) -> AggregateId {
        order_id.derive("delivery-assignment")
    }

    pub fn order_id(&self) -> Option<AggregateId> {
        self.order_id
    }

    pub fn agent_id(&self) -> Option<AgentId> {
        self.agent_id
    }

    pub fn state(&self) -> AssignmentState {
        self.state
    }

    pub fn estimate(&self) -> DeliveryEstimate {
        self.estimate
    }

    pub fn assigned_at(&self) -> Option<DateTime<Utc>> {
        self.assigned_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn is_assigned_to(&self, actor: &Actor) -> bool {
        matches!(actor, Actor::Agent(id) if Some(*id) == self.agent_id)
    }
}

// Command methods (return events)
impl DeliveryAssignment {
    /// Creates the assignment for an order that is still in progress.
    ///
    /// Re-assigning the same agent is a no-op so the step can be retried.
    pub fn assign(
        &self,
        order: &Order,
        agent_id: AgentId,
        estimate: DeliveryEstimate,
    ) -> Result<Vec<DeliveryEvent>, DeliveryError> {
        if self.id.is_some() {
            return match self.agent_id {
                Some(current) if current == agent_id => Ok(vec![]),
                current => Err(DeliveryError::AlreadyAssigned {
                    agent_id: current.map(|a| a.to_string()).unwrap_or_default(),
                }),
            };
        }

        let order_id = order.id().ok_or(DeliveryError::OrderNotPlaced)?;
        if order.fulfillment_state() != FulfillmentState::InProgress {
            return Err(DeliveryError::OrderNotAssignable {
                state: order.fulfillment_state(),
            });
        }

        Ok(vec![DeliveryEvent::AssignmentCreated(AssignmentCreatedData {
            assignment_id: Self::id_for(order_id),
            order_id,
            agent_id,
            estimate,
            assigned_at: Utc::now(),
        })])
    }

    /// Moves the assignment forward or cancels it.
    ///
    /// Only the assigned agent or a privileged actor may advance. Asking for
    /// the current state again is a no-op.
    pub fn advance(
        &self,
        target: AssignmentState,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<Vec<DeliveryEvent>, DeliveryError> {
        let assignment_id = self.id.ok_or(DeliveryError::NotFound)?;

        if !self.is_assigned_to(actor) && !actor.is_privileged() {
            return Err(DeliveryError::Forbidden {
                actor: actor.to_string(),
                assignment_id: assignment_id.to_string(),
            });
        }

        if self.state == target {
            return Ok(vec![]);
        }

        if !self.state.can_transition_to(target) {
            return Err(DeliveryError::InvalidTransition {
                from: self.state,
                to: target,
            });
        }

        let actor = actor.clone();
        let now = Utc::now();
        let event = match target {
            AssignmentState::InProgress => DeliveryEvent::AssignmentStarted {
                actor,
                started_at: now,
            },
            AssignmentState::Completed => DeliveryEvent::AssignmentCompleted {
                actor,
                completed_at: now,
            },
            AssignmentState::Cancelled => DeliveryEvent::AssignmentCancelled {
                actor,
                reason,
                cancelled_at: now,
            },
            AssignmentState::Assigned => {
                return Err(DeliveryError::InvalidTransition {
                    from: self.state,
                    to: target,
                });
            }
        };

        Ok(vec![event])
    }
}

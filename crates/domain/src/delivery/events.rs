//! Delivery assignment events.

use chrono::{DateTime, Utc};
use common::{Actor, AgentId, AggregateId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::DeliveryEstimate;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DeliveryEvent {
    AssignmentCreated(AssignmentCreatedData),

    /// The agent picked up the parcel.
    AssignmentStarted { actor: Actor, started_at: DateTime<Utc> },

    AssignmentCompleted { actor: Actor, completed_at: DateTime<Utc> },

    AssignmentCancelled {
        actor: Actor,
        reason: Option<String>,
        cancelled_at: DateTime<Utc>,
    },
}

impl DomainEvent for DeliveryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DeliveryEvent::AssignmentCreated(_) => "AssignmentCreated",
            DeliveryEvent::AssignmentStarted { .. } => "AssignmentStarted",
            DeliveryEvent::AssignmentCompleted { .. } => "AssignmentCompleted",
            DeliveryEvent::AssignmentCancelled { .. } => "AssignmentCancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentCreatedData {
    pub assignment_id: AggregateId,
    pub order_id: AggregateId,
    pub agent_id: AgentId,
    pub estimate: DeliveryEstimate,
    pub assigned_at: DateTime<Utc>,
}

//! Reconciliation task events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::DomainEvent;
use serde::{Deserialize, Serialize};

use crate::action::ReconciliationAction;

/// Event type of [`ReconciliationEvent::TaskEnqueued`], used to find tasks.
pub const TASK_ENQUEUED: &str = "ReconciliationTaskEnqueued";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ReconciliationEvent {
    /// A step gave up retrying and left its action here.
    TaskEnqueued(TaskEnqueuedData),

    /// A reconciliation run tried the action and it failed again.
    AttemptFailed(AttemptFailedData),

    TaskResolved { resolved_at: DateTime<Utc> },

    TaskAbandoned(AttemptFailedData),
}

impl DomainEvent for ReconciliationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReconciliationEvent::TaskEnqueued(_) => TASK_ENQUEUED,
            ReconciliationEvent::AttemptFailed(_) => "ReconciliationAttemptFailed",
            ReconciliationEvent::TaskResolved { .. } => "ReconciliationTaskResolved",
            ReconciliationEvent::TaskAbandoned(_) => "ReconciliationTaskAbandoned",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnqueuedData {
    pub task_id: AggregateId,
    pub order_id: AggregateId,
    pub action: ReconciliationAction,
    /// The error that exhausted the retries.
    pub error: String,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptFailedData {
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

// Convenience constructors
impl ReconciliationEvent {
    pub fn task_enqueued(
        order_id: AggregateId,
        action: ReconciliationAction,
        error: impl Into<String>,
    ) -> Self {
        ReconciliationEvent::TaskEnqueued(TaskEnqueuedData {
            task_id: action.task_id(order_id),
            order_id,
            action,
            error: error.into(),
            enqueued_at: Utc::now(),
        })
    }

    pub fn attempt_failed(error: impl Into<String>) -> Self {
        ReconciliationEvent::AttemptFailed(AttemptFailedData {
            error: error.into(),
            failed_at: Utc::now(),
        })
    }

    pub fn task_resolved() -> Self {
        ReconciliationEvent::TaskResolved {
            resolved_at: Utc::now(),
        }
    }

    pub fn task_abandoned(error: impl Into<String>) -> Self {
        ReconciliationEvent::TaskAbandoned(AttemptFailedData {
            error: error.into(),
            failed_at: Utc::now(),
        })
    }
}

//! Reconciliation task aggregate.

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::Aggregate;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::action::ReconciliationAction;
use crate::error::SettlementError;
use crate::events::ReconciliationEvent;
use crate::state::TaskState;

/// A durable record of a downstream action that still has to happen.
///
/// Its id is derived from the order id and the action key, so enqueueing
/// the same action twice lands on the same task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationTask {
    id: Option<AggregateId>,
    version: Version,
    order_id: Option<AggregateId>,
    action: Option<ReconciliationAction>,
    state: TaskState,
    /// Failed reconciliation runs since the task was last enqueued.
    attempts: u32,
    last_error: Option<String>,
    enqueued_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
}

impl Aggregate for ReconciliationTask {
    type Event = ReconciliationEvent;
    type Error = SettlementError;

    fn aggregate_type() -> &'static str {
        "ReconciliationTask"
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
            ReconciliationEvent::TaskEnqueued(data) => {
                self.id = Some(data.task_id);
                self.order_id = Some(data.order_id);
                self.action = Some(data.action);
                self.state = TaskState::Pending;
                self.attempts = 0;
                self.last_error = Some(data.error);
                self.enqueued_at = Some(data.enqueued_at);
                self.resolved_at = None;
            }
            ReconciliationEvent::AttemptFailed(data) => {
                self.attempts += 1;
                self.last_error = Some(data.error);
            }
            ReconciliationEvent::TaskResolved { resolved_at } => {
                self.state = TaskState::Resolved;
                self.resolved_at = Some(resolved_at);
            }
            ReconciliationEvent::TaskAbandoned(data) => {
                self.attempts += 1;
                self.state = TaskState::Abandoned;
                self.last_error = Some(data.error);
            }
        }
    }
}

// Query methods
impl ReconciliationTask {
    pub fn order_id(&self) -> Option<AggregateId> {
        self.order_id
    }

    pub fn action(&self) -> Option<&ReconciliationAction> {
        self.action.as_ref()
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn enqueued_at(&self) -> Option<DateTime<Utc>> {
        self.enqueued_at
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }
}

// Command methods (return events)
impl ReconciliationTask {
    /// Opens the task, or reopens a finished one. A task that is already
    /// pending is left as is.
    pub fn enqueue(
        &self,
        order_id: AggregateId,
        action: ReconciliationAction,
        error: &str,
    ) -> Result<Vec<ReconciliationEvent>, SettlementError> {
        if self.id.is_some() && self.state.is_pending() {
            return Ok(vec![]);
        }
        Ok(vec![ReconciliationEvent::task_enqueued(
            order_id, action, error,
        )])
    }

    pub fn record_failure(&self, error: &str) -> Result<Vec<ReconciliationEvent>, SettlementError> {
        if !self.state.is_pending() {
            tracing::debug!(
                task_id = ?self.id,
                state = %self.state,
                "ignoring failure on finished task"
            );
            return Ok(vec![]);
        }
        Ok(vec![ReconciliationEvent::attempt_failed(error)])
    }

    pub fn resolve(&self) -> Result<Vec<ReconciliationEvent>, SettlementError> {
        if !self.state.is_pending() {
            return Ok(vec![]);
        }
        Ok(vec![ReconciliationEvent::task_resolved()])
    }

    pub fn abandon(&self, error: &str) -> Result<Vec<ReconciliationEvent>, SettlementError> {
        if !self.state.is_pending() {
            return Ok(vec![]);
        }
        Ok(vec![ReconciliationEvent::task_abandoned(error)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enqueued() -> (ReconciliationTask, AggregateId) {
        let order_id = AggregateId::new();
        let mut task = ReconciliationTask::default();
        let events = task
            .enqueue(order_id, ReconciliationAction::SettleCommission, "ledger down")
            .unwrap();
        task.apply_events(events);
        (task, order_id)
    }

    #[test]
    fn test_default_task() {
        let task = ReconciliationTask::default();
        assert!(task.id().is_none());
        assert_eq!(task.state(), TaskState::Pending);
        assert_eq!(task.attempts(), 0);
    }

    #[test]
    fn test_enqueue_sets_fields() {
        let (task, order_id) = enqueued();
        assert_eq!(
            task.id(),
            Some(ReconciliationAction::SettleCommission.task_id(order_id))
        );
        assert_eq!(task.order_id(), Some(order_id));
        assert_eq!(task.action(), Some(&ReconciliationAction::SettleCommission));
        assert_eq!(task.last_error(), Some("ledger down"));
        assert!(task.enqueued_at().is_some());
    }

    #[test]
    fn test_enqueue_twice_is_noop() {
        let (task, order_id) = enqueued();
        let events = task
            .enqueue(order_id, ReconciliationAction::SettleCommission, "again")
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_failures_count_attempts() {
        let (mut task, _) = enqueued();
        for i in 0..3 {
            let events = task.record_failure(&format!("try {i}")).unwrap();
            task.apply_events(events);
        }
        assert_eq!(task.attempts(), 3);
        assert_eq!(task.last_error(), Some("try 2"));
        assert!(task.state().is_pending());
    }

    #[test]
    fn test_resolve_then_reopen() {
        let (mut task, order_id) = enqueued();
        task.apply_events(task.record_failure("x").unwrap());
        task.apply_events(task.resolve().unwrap());
        assert_eq!(task.state(), TaskState::Resolved);
        assert!(task.resolved_at().is_some());

        // Resolving again changes nothing.
        assert!(task.resolve().unwrap().is_empty());

        let events = task
            .enqueue(order_id, ReconciliationAction::SettleCommission, "down again")
            .unwrap();
        assert_eq!(events.len(), 1);
        task.apply_events(events);
        assert_eq!(task.state(), TaskState::Pending);
        assert_eq!(task.attempts(), 0);
        assert!(task.resolved_at().is_none());
    }

    #[test]
    fn test_abandon() {
        let (mut task, _) = enqueued();
        task.apply_events(task.abandon("order canceled").unwrap());
        assert_eq!(task.state(), TaskState::Abandoned);
        assert_eq!(task.attempts(), 1);
        assert!(task.record_failure("late").unwrap().is_empty());
    }
}

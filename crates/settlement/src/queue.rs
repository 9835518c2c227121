//! Durable reconciliation queue backed by the event store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{Aggregate, AggregateLocks, CommandHandler, CommandResult, ErrorKind};
use event_store::EventStore;
use tokio::sync::RwLock;

use crate::action::ReconciliationAction;
use crate::aggregate::ReconciliationTask;
use crate::error::SettlementError;
use crate::events::{ReconciliationEvent, TASK_ENQUEUED};

/// Ids of the tasks still pending, with their enqueue time.
///
/// Filled from the full task history on first use, then kept current by
/// the queue's own writes.
#[derive(Debug, Default)]
struct PendingIndex {
    loaded: bool,
    tasks: HashMap<AggregateId, Option<DateTime<Utc>>>,
}

impl PendingIndex {
    fn track(&mut self, task: &ReconciliationTask) {
        let Some(task_id) = task.id() else {
            return;
        };
        if task.state().is_pending() {
            self.tasks.insert(task_id, task.enqueued_at());
        } else {
            self.tasks.remove(&task_id);
        }
    }

    fn ids(&self) -> Vec<AggregateId> {
        let mut ids: Vec<_> = self.tasks.iter().map(|(id, at)| (*id, *at)).collect();
        ids.sort_by_key(|(_, at)| *at);
        ids.into_iter().map(|(id, _)| id).collect()
    }
}

/// Stores actions that ran out of retries until a reconciliation run
/// gets them through.
pub struct ReconciliationQueue<S: EventStore> {
    handler: CommandHandler<S, ReconciliationTask>,
    pending: Arc<RwLock<PendingIndex>>,
}

impl<S: EventStore + Clone> Clone for ReconciliationQueue<S> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<S: EventStore> ReconciliationQueue<S> {
    pub fn new(store: S) -> Self {
        Self::with_locks(store, AggregateLocks::new())
    }

    pub fn with_locks(store: S, locks: AggregateLocks) -> Self {
        Self {
            handler: CommandHandler::with_locks(store, locks),
            pending: Arc::new(RwLock::new(PendingIndex::default())),
        }
    }

    /// Records `action` for `order_id`. Enqueueing an action that is already
    /// pending returns the existing task.
    #[tracing::instrument(skip(self, action, error), fields(action = %action))]
    pub async fn enqueue(
        &self,
        order_id: AggregateId,
        action: ReconciliationAction,
        error: &SettlementError,
    ) -> Result<ReconciliationTask, SettlementError> {
        let task_id = action.task_id(order_id);
        let name = action.name();
        let reason = error.to_string();

        let (task, appended) = match self
            .execute(task_id, |task| task.enqueue(order_id, action, &reason))
            .await
        {
            Ok(result) => (result.aggregate, !result.events.is_empty()),
            // Another process enqueued it first.
            Err(e) if e.kind() == ErrorKind::ConcurrencyConflict => {
                let task = self
                    .get(task_id)
                    .await?
                    .ok_or(SettlementError::TaskNotFound(task_id))?;
                self.pending.write().await.track(&task);
                (task, false)
            }
            Err(e) => return Err(e),
        };

        if appended {
            metrics::counter!("reconciliation_enqueued_total", "action" => name).increment(1);
            tracing::warn!(%task_id, %reason, "step handed to reconciliation");
        }
        Ok(task)
    }

    pub async fn resolve(
        &self,
        task_id: AggregateId,
    ) -> Result<ReconciliationTask, SettlementError> {
        let result = self
            .execute_existing(task_id, ReconciliationTask::resolve)
            .await?;
        if !result.is_noop() {
            metrics::counter!("reconciliation_resolved_total").increment(1);
            tracing::info!(
                %task_id,
                attempts = result.aggregate.attempts(),
                "reconciliation task resolved"
            );
        }
        Ok(result.aggregate)
    }

    pub async fn record_failure(
        &self,
        task_id: AggregateId,
        error: &SettlementError,
    ) -> Result<ReconciliationTask, SettlementError> {
        let reason = error.to_string();
        let result = self
            .execute_existing(task_id, |task| task.record_failure(&reason))
            .await?;
        Ok(result.aggregate)
    }

    pub async fn abandon(
        &self,
        task_id: AggregateId,
        error: &SettlementError,
    ) -> Result<ReconciliationTask, SettlementError> {
        let reason = error.to_string();
        let result = self
            .execute_existing(task_id, |task| task.abandon(&reason))
            .await?;
        if !result.is_noop() {
            tracing::error!(%task_id, %reason, "reconciliation task abandoned");
        }
        Ok(result.aggregate)
    }

    /// Loads a task by ID.
    pub async fn get(
        &self,
        task_id: AggregateId,
    ) -> Result<Option<ReconciliationTask>, SettlementError> {
        Ok(self.handler.load_existing(task_id).await?)
    }

    /// Every task ever enqueued, oldest first. Reads the whole task
    /// history; runs use [`ReconciliationQueue::pending`].
    pub async fn list(&self) -> Result<Vec<ReconciliationTask>, SettlementError> {
        let enqueued = self.handler.store().get_events_by_type(TASK_ENQUEUED).await?;

        let mut seen = HashSet::new();
        let mut tasks = Vec::new();
        for envelope in enqueued {
            if !seen.insert(envelope.aggregate_id) {
                continue;
            }
            if let Some(task) = self.get(envelope.aggregate_id).await? {
                tasks.push(task);
            }
        }

        tasks.sort_by_key(|task| task.enqueued_at());
        Ok(tasks)
    }

    /// Tasks still waiting to be run, oldest first.
    ///
    /// Only the tasks in the pending index are loaded. Each one is read
    /// back from the store, so a task finished elsewhere drops out here.
    pub async fn pending(&self) -> Result<Vec<ReconciliationTask>, SettlementError> {
        self.load_index().await?;
        let ids = self.pending.read().await.ids();

        let mut tasks = Vec::with_capacity(ids.len());
        for task_id in ids {
            match self.get(task_id).await? {
                Some(task) if task.state().is_pending() => tasks.push(task),
                Some(task) => self.pending.write().await.track(&task),
                None => {
                    self.pending.write().await.tasks.remove(&task_id);
                }
            }
        }
        Ok(tasks)
    }

    /// Fills the pending index from the task history the first time it is
    /// needed.
    async fn load_index(&self) -> Result<(), SettlementError> {
        if self.pending.read().await.loaded {
            return Ok(());
        }

        let tasks = self.list().await?;
        let mut index = self.pending.write().await;
        if !index.loaded {
            for task in tasks.iter().filter(|task| task.state().is_pending()) {
                index.track(task);
            }
            index.loaded = true;
            tracing::debug!(pending = index.tasks.len(), "pending task index loaded");
        }
        Ok(())
    }

    /// Runs `command` against the task and keeps the pending index current.
    async fn execute<F>(
        &self,
        task_id: AggregateId,
        command: F,
    ) -> Result<CommandResult<ReconciliationTask>, SettlementError>
    where
        F: FnOnce(&ReconciliationTask) -> Result<Vec<ReconciliationEvent>, SettlementError>,
    {
        let result = self
            .handler
            .execute_as::<SettlementError, _>(task_id, command)
            .await?;
        if !result.is_noop() {
            self.pending.write().await.track(&result.aggregate);
        }
        Ok(result)
    }

    async fn execute_existing<F>(
        &self,
        task_id: AggregateId,
        command: F,
    ) -> Result<CommandResult<ReconciliationTask>, SettlementError>
    where
        F: FnOnce(&ReconciliationTask) -> Result<Vec<ReconciliationEvent>, SettlementError>,
    {
        self.execute(task_id, |task| match task.id() {
            Some(_) => command(task),
            None => Err(SettlementError::TaskNotFound(task_id)),
        })
        .await
    }
}

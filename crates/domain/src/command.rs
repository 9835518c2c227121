//! Command handling infrastructure.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{AppendOptions, EventEnvelope, EventStore, EventStoreExt, Snapshot, Version};
use serde::de::DeserializeOwned;

use crate::aggregate::{Aggregate, DomainEvent, SnapshotCapable};
use crate::error::DomainError;
use crate::locks::AggregateLocks;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were persisted. Empty when the command was a no-op,
    /// e.g. an idempotent replay.
    pub events: Vec<A::Event>,

    pub new_version: Version,
}

impl<A: Aggregate> CommandResult<A> {
    /// True if the command changed nothing.
    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }
}

/// An intention to change one aggregate.
pub trait Command: Send + Sync {
    type Aggregate: Aggregate;

    fn aggregate_id(&self) -> AggregateId;
}

/// Loads an aggregate, runs a command against it and appends the result.
///
/// Commands on the same aggregate id are serialized through
/// [`AggregateLocks`]; the append still carries the loaded version so a
/// writer in another process surfaces as `ConcurrencyConflict`.
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    locks: AggregateLocks,
    _phantom: PhantomData<A>,
}

impl<S, A> Clone for CommandHandler<S, A>
where
    S: EventStore + Clone,
    A: Aggregate,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            locks: self.locks.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate + DeserializeOwned,
{
    pub fn new(store: S) -> Self {
        Self::with_locks(store, AggregateLocks::new())
    }

    /// Shares a lock table with other handlers.
    pub fn with_locks(store: S, locks: AggregateLocks) -> Self {
        Self {
            store,
            locks,
            _phantom: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate from the event store.
    ///
    /// If the aggregate doesn't exist, returns a default instance.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let (snapshot, events) = self.store.load_aggregate(aggregate_id).await?;

        let mut aggregate = match snapshot {
            Some(snapshot) => Self::restore_from_snapshot(&snapshot)?,
            None => A::default(),
        };

        for envelope in events {
            let event: A::Event = envelope.decode()?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        Ok(aggregate.id().is_some().then_some(aggregate))
    }

    /// Executes a command and persists the resulting events.
    ///
    /// The command function receives the current aggregate state and returns
    /// either a list of events to apply, or an error.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        self.execute_as(aggregate_id, command_fn).await
    }

    /// [`CommandHandler::execute`] for callers with their own error type.
    /// Store and serialization failures reach `E` through [`DomainError`].
    pub async fn execute_as<E, F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, E>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        E: From<A::Error> + From<DomainError>,
    {
        let _guard = self.locks.acquire(aggregate_id).await;

        let mut aggregate = self.load(aggregate_id).await?;
        let current_version = aggregate.version();

        let events = command_fn(&aggregate)?;

        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events: vec![],
                new_version: current_version,
            });
        }

        let envelopes = Self::build_envelopes(aggregate_id, current_version, &events)?;
        let new_version = self
            .store
            .append(envelopes, AppendOptions::after(current_version))
            .await
            .map_err(DomainError::from)?;

        for event in &events {
            aggregate.apply(event.clone());
        }
        aggregate.set_version(new_version);

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }

    fn build_envelopes(
        aggregate_id: AggregateId,
        current_version: Version,
        events: &[A::Event],
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        let mut envelopes = Vec::with_capacity(events.len());
        let mut version = current_version;

        for event in events {
            version = version.next();
            let envelope = EventEnvelope::builder()
                .aggregate_id(aggregate_id)
                .aggregate_type(A::aggregate_type())
                .event_type(event.event_type())
                .version(version)
                .payload(event)?
                .build()?;
            envelopes.push(envelope);
        }

        Ok(envelopes)
    }

    fn restore_from_snapshot(snapshot: &Snapshot) -> Result<A, DomainError> {
        let mut aggregate: A = snapshot.restore()?;
        aggregate.set_version(snapshot.version);
        Ok(aggregate)
    }
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: SnapshotCapable,
{
    /// Executes a command and saves a snapshot when the interval is reached.
    ///
    /// The events are already committed when the snapshot is written, so a
    /// snapshot failure is logged and not returned.
    pub async fn execute_with_snapshot<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let result = self.execute(aggregate_id, command_fn).await?;

        if !result.is_noop() && result.aggregate.should_snapshot() {
            let saved = match Snapshot::capture(
                aggregate_id,
                A::aggregate_type(),
                result.new_version,
                &result.aggregate,
            ) {
                Ok(snapshot) => self.store.save_snapshot(snapshot).await,
                Err(e) => Err(e.into()),
            };
            if let Err(error) = saved {
                tracing::warn!(%aggregate_id, %error, "failed to save snapshot");
            }
        }

        Ok(result)
    }
}

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Snapshot, Version};

/// Options for appending events to the store.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Version the aggregate must currently be at. `None` skips the check.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// No version check. Only used by tooling and tests.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// The aggregate must not exist yet.
    pub fn expect_new() -> Self {
        Self::expect_version(Version::initial())
    }

    /// Picks `expect_new` or `expect_version` based on the loaded version.
    pub fn after(current: Version) -> Self {
        if current == Version::initial() {
            Self::expect_new()
        } else {
            Self::expect_version(current)
        }
    }
}

/// A stream of events in insertion order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Persistence for event-sourced aggregates.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a batch of events for one aggregate, atomically.
    ///
    /// Fails with `ConcurrencyConflict` when `options.expected_version` is set
    /// and does not match the aggregate's current version. Returns the
    /// aggregate's version after the append.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version>;

    /// All events of an aggregate in version order.
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Events of an aggregate with `version >= from_version`.
    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Every event of the given type, in insertion order.
    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>>;

    /// Streams the whole log in insertion order.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// Current version of an aggregate, `None` if it has no events.
    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;

    /// Stores a snapshot, replacing any previous one for the aggregate.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>>;
}

/// Convenience methods available on every [`EventStore`].
#[async_trait]
pub trait EventStoreExt: EventStore {
    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }

    /// Returns the latest snapshot, if any, plus the events recorded after it.
    async fn load_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<(Option<Snapshot>, Vec<EventEnvelope>)> {
        match self.get_snapshot(aggregate_id).await? {
            Some(snapshot) => {
                let events = self
                    .get_events_for_aggregate_from_version(aggregate_id, snapshot.version.next())
                    .await?;
                Ok((Some(snapshot), events))
            }
            None => Ok((None, self.get_events_for_aggregate(aggregate_id).await?)),
        }
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks that a batch targets one aggregate with consecutive versions.
pub fn validate_events_for_append(events: &[EventEnvelope]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty batch".to_string(),
        ));
    };

    let mut expected = first.version;
    for event in &events[1..] {
        if event.aggregate_id != first.aggregate_id || event.aggregate_type != first.aggregate_type
        {
            return Err(EventStoreError::InvalidAppend(
                "all events in a batch must belong to the same aggregate".to_string(),
            ));
        }
        expected = expected.next();
        if event.version != expected {
            return Err(EventStoreError::InvalidAppend(format!(
                "versions must be consecutive: expected {expected}, got {}",
                event.version
            )));
        }
    }

    Ok(())
}

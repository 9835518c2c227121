use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, Snapshot, Version,
    store::{AppendOptions, EventStore, EventStream, validate_events_for_append},
};

#[derive(Default)]
struct Log {
    /// Every event in insertion order.
    events: Vec<EventEnvelope>,
    /// Positions in `events` per aggregate, in version order.
    streams: HashMap<AggregateId, Vec<usize>>,
    snapshots: HashMap<AggregateId, Snapshot>,
}

impl Log {
    fn current_version(&self, aggregate_id: AggregateId) -> Version {
        self.streams
            .get(&aggregate_id)
            .and_then(|positions| positions.last())
            .map(|&pos| self.events[pos].version)
            .unwrap_or_default()
    }

    fn stream(&self, aggregate_id: AggregateId) -> impl Iterator<Item = &EventEnvelope> {
        self.streams
            .get(&aggregate_id)
            .into_iter()
            .flatten()
            .map(|&pos| &self.events[pos])
    }
}

/// In-memory event store.
///
/// Used by tests and by the API when no `DATABASE_URL` is configured.
/// Clones share the same log.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<Log>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.log.read().await.events.len()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        validate_events_for_append(&events)?;
        let aggregate_id = events[0].aggregate_id;
        let first_version = events[0].version;

        let mut log = self.log.write().await;
        let current = log.current_version(aggregate_id);

        if let Some(expected) = options.expected_version
            && current != expected
        {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: current,
            });
        }

        // Same guarantee as the unique (aggregate_id, version) index in Postgres.
        if first_version != current.next() {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: options.expected_version.unwrap_or(current),
                actual: current,
            });
        }

        let mut last = current;
        for event in events {
            last = event.version;
            let position = log.events.len();
            log.events.push(event);
            log.streams.entry(aggregate_id).or_default().push(position);
        }

        metrics::counter!("event_store_appends_total", "backend" => "memory").increment(1);
        Ok(last)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        Ok(log.stream(aggregate_id).cloned().collect())
    }

    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        Ok(log
            .stream(aggregate_id)
            .filter(|e| e.version >= from_version)
            .cloned()
            .collect())
    }

    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        Ok(log
            .events
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect())
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        let events = self.log.read().await.events.clone();
        Ok(Box::pin(futures_util::stream::iter(
            events.into_iter().map(Ok),
        )))
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let log = self.log.read().await;
        Ok(log
            .streams
            .contains_key(&aggregate_id)
            .then(|| log.current_version(aggregate_id)))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut log = self.log.write().await;
        let stale = log
            .snapshots
            .get(&snapshot.aggregate_id)
            .is_some_and(|existing| existing.version >= snapshot.version);
        if !stale {
            log.snapshots.insert(snapshot.aggregate_id, snapshot);
        }
        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        Ok(self.log.read().await.snapshots.get(&aggregate_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;
    use crate::EventStoreExt;

    fn event(aggregate_id: AggregateId, version: i64, event_type: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("Wallet")
            .event_type(event_type)
            .version(Version::new(version))
            .payload_raw(serde_json::json!({"v": version}))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn append_and_read_back_in_version_order() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        let version = store
            .append(
                vec![event(id, 1, "WalletOpened"), event(id, 2, "WalletCredited")],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();
        assert_eq!(version, Version::new(2));

        let events = store.get_events_for_aggregate(id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "WalletOpened");
        assert_eq!(events[1].version, Version::new(2));
    }

    #[tokio::test]
    async fn stale_expected_version_conflicts() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(vec![event(id, 1, "WalletOpened")], AppendOptions::expect_new())
            .await
            .unwrap();

        let result = store
            .append(vec![event(id, 1, "WalletOpened")], AppendOptions::expect_new())
            .await;

        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict { actual, .. }) if actual == Version::new(1)
        ));
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn duplicate_version_without_expectation_conflicts() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(vec![event(id, 1, "WalletOpened")], AppendOptions::new())
            .await
            .unwrap();

        let result = store
            .append(vec![event(id, 1, "WalletCredited")], AppendOptions::new())
            .await;
        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict { .. })
        ));
    }

    #[tokio::test]
    async fn aggregates_are_isolated() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        store
            .append(vec![event(a, 1, "WalletOpened")], AppendOptions::expect_new())
            .await
            .unwrap();
        store
            .append(vec![event(b, 1, "WalletOpened")], AppendOptions::expect_new())
            .await
            .unwrap();

        assert_eq!(
            store.get_aggregate_version(a).await.unwrap(),
            Some(Version::first())
        );
        assert_eq!(store.get_events_for_aggregate(b).await.unwrap().len(), 1);
        assert!(!store.aggregate_exists(AggregateId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn events_by_type_and_stream() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        store
            .append(
                vec![event(a, 1, "WalletOpened"), event(a, 2, "WalletCredited")],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();
        store
            .append(vec![event(b, 1, "WalletOpened")], AppendOptions::expect_new())
            .await
            .unwrap();

        let opened = store.get_events_by_type("WalletOpened").await.unwrap();
        assert_eq!(opened.len(), 2);

        let all: Vec<_> = store.stream_all_events().await.unwrap().collect().await;
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].as_ref().unwrap().aggregate_id, b);
    }

    #[tokio::test]
    async fn load_aggregate_starts_after_snapshot() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(
                vec![
                    event(id, 1, "WalletOpened"),
                    event(id, 2, "WalletCredited"),
                    event(id, 3, "WalletDebited"),
                ],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();
        store
            .save_snapshot(
                Snapshot::capture(id, "Wallet", Version::new(2), &serde_json::json!({})).unwrap(),
            )
            .await
            .unwrap();

        let (snapshot, events) = store.load_aggregate(id).await.unwrap();
        assert_eq!(snapshot.unwrap().version, Version::new(2));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "WalletDebited");
    }
}

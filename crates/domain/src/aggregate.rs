//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// A fact recorded in the event log, named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Name stored alongside the payload, used for filtering by type.
    fn event_type(&self) -> &'static str;
}

/// An event-sourced consistency boundary.
///
/// Orders, wallets, delivery assignments and commission entries are each
/// rebuilt by replaying their events. Command methods inspect the current
/// state and return new events; `apply` folds an event into the state and
/// must never fail.
pub trait Aggregate: Default + Send + Sync + Sized {
    type Event: DomainEvent;

    type Error: std::error::Error + Send + Sync;

    /// Aggregate kind stored on every envelope.
    fn aggregate_type() -> &'static str;

    /// `None` until the creating event has been applied.
    fn id(&self) -> Option<AggregateId>;

    fn version(&self) -> Version;

    /// Called by the command handler after loading events.
    fn set_version(&mut self, version: Version);

    /// Folds one event into the state. Pure and infallible.
    fn apply(&mut self, event: Self::Event);

    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

/// Aggregates whose state is periodically stored as a snapshot.
pub trait SnapshotCapable: Aggregate + Serialize + DeserializeOwned {
    /// Number of events between snapshots.
    fn snapshot_interval() -> usize {
        100
    }

    fn should_snapshot(&self) -> bool {
        self.version().as_i64() > 0
            && (self.version().as_i64() as usize).is_multiple_of(Self::snapshot_interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum TallyEvent {
        Opened { id: AggregateId },
        Counted { by: i64 },
    }

    impl DomainEvent for TallyEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TallyEvent::Opened { .. } => "TallyOpened",
                TallyEvent::Counted { .. } => "TallyCounted",
            }
        }
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    struct Tally {
        id: Option<AggregateId>,
        total: i64,
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("tally error")]
    struct TallyError;

    impl Aggregate for Tally {
        type Event = TallyEvent;
        type Error = TallyError;

        fn aggregate_type() -> &'static str {
            "Tally"
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
                TallyEvent::Opened { id } => self.id = Some(id),
                TallyEvent::Counted { by } => self.total += by,
            }
        }
    }

    impl SnapshotCapable for Tally {
        fn snapshot_interval() -> usize {
            10
        }
    }

    #[test]
    fn apply_events_folds_in_order() {
        let id = AggregateId::new();
        let mut tally = Tally::default();
        tally.apply_events(vec![
            TallyEvent::Opened { id },
            TallyEvent::Counted { by: 5 },
            TallyEvent::Counted { by: -2 },
        ]);

        assert_eq!(tally.id(), Some(id));
        assert_eq!(tally.total, 3);
        assert_eq!(TallyEvent::Counted { by: 1 }.event_type(), "TallyCounted");
    }

    #[test]
    fn snapshot_every_interval() {
        let mut tally = Tally::default();
        assert!(!tally.should_snapshot());

        tally.set_version(Version::new(10));
        assert!(tally.should_snapshot());

        tally.set_version(Version::new(11));
        assert!(!tally.should_snapshot());
    }
}

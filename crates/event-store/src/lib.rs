//! Event log shared by every aggregate in the settlement services.
//!
//! Orders, wallets, delivery assignments, commission entries and
//! reconciliation tasks are all persisted here. Appends are atomic per
//! aggregate and guarded by an expected version, which is what serializes
//! competing writers across processes.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod snapshot;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use snapshot::Snapshot;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream};

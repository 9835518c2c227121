use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AggregateId, EventStoreError};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version number of an aggregate, used for optimistic concurrency control.
///
/// A fresh aggregate is at version 0; its first event carries version 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// The version of an aggregate with no events.
    pub fn initial() -> Self {
        Self(0)
    }

    /// The version carried by an aggregate's first event.
    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A persisted event together with the metadata needed to route and replay it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,

    /// Domain event name, e.g. `"FulfillmentChanged"` or `"WalletCredited"`.
    pub event_type: String,

    pub aggregate_id: AggregateId,

    /// Aggregate kind, e.g. `"Order"` or `"Wallet"`.
    pub aggregate_type: String,

    /// The version of the aggregate after this event.
    pub version: Version,

    pub timestamp: DateTime<Utc>,

    /// The serialized domain event.
    pub payload: serde_json::Value,

    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelope {
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::default()
    }

    /// Decodes the payload into a concrete domain event.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Builder for [`EventEnvelope`].
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    event_id: Option<EventId>,
    event_type: Option<String>,
    aggregate_id: Option<AggregateId>,
    aggregate_type: Option<String>,
    version: Option<Version>,
    timestamp: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
    metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelopeBuilder {
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Overrides the timestamp. Defaults to now.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Serializes a domain event into the payload.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Builds the envelope, failing if a required field was never set.
    pub fn build(self) -> Result<EventEnvelope, EventStoreError> {
        Ok(EventEnvelope {
            event_id: self.event_id.unwrap_or_default(),
            event_type: self
                .event_type
                .ok_or(EventStoreError::InvalidEnvelope("event_type"))?,
            aggregate_id: self
                .aggregate_id
                .ok_or(EventStoreError::InvalidEnvelope("aggregate_id"))?,
            aggregate_type: self
                .aggregate_type
                .ok_or(EventStoreError::InvalidEnvelope("aggregate_type"))?,
            version: self
                .version
                .ok_or(EventStoreError::InvalidEnvelope("version"))?,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            payload: self
                .payload
                .ok_or(EventStoreError::InvalidEnvelope("payload"))?,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_sequence() {
        assert_eq!(Version::initial().next(), Version::first());
        assert!(Version::new(1) < Version::new(2));
    }

    #[test]
    fn builder_produces_envelope() {
        let aggregate_id = AggregateId::new();
        let envelope = EventEnvelope::builder()
            .event_type("WalletCredited")
            .aggregate_id(aggregate_id)
            .aggregate_type("Wallet")
            .version(Version::first())
            .payload_raw(serde_json::json!({"amount": 100}))
            .metadata("request_id", serde_json::json!("req-1"))
            .build()
            .unwrap();

        assert_eq!(envelope.event_type, "WalletCredited");
        assert_eq!(envelope.aggregate_id, aggregate_id);
        assert_eq!(envelope.version, Version::first());
        assert_eq!(
            envelope.metadata.get("request_id"),
            Some(&serde_json::json!("req-1"))
        );
    }

    #[test]
    fn builder_reports_missing_field() {
        let result = EventEnvelope::builder()
            .event_type("X")
            .aggregate_type("Order")
            .version(Version::first())
            .payload_raw(serde_json::json!({}))
            .build();
        assert!(matches!(
            result,
            Err(EventStoreError::InvalidEnvelope("aggregate_id"))
        ));
    }

    #[test]
    fn decode_payload() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct Payload {
            amount: i64,
        }
        let envelope = EventEnvelope::builder()
            .event_type("X")
            .aggregate_id(AggregateId::new())
            .aggregate_type("Wallet")
            .version(Version::first())
            .payload_raw(serde_json::json!({"amount": 7}))
            .build()
            .unwrap();
        assert_eq!(envelope.decode::<Payload>().unwrap(), Payload { amount: 7 });
    }
}

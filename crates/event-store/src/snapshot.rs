use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{AggregateId, Version};

/// Serialized aggregate state at a given version.
///
/// Loading starts from the latest snapshot and replays only the events
/// recorded after it. Long-lived orders with many status changes benefit most.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    /// Version of the last event folded into `state`.
    pub version: Version,
    pub timestamp: DateTime<Utc>,
    pub state: serde_json::Value,
}

impl Snapshot {
    /// Captures `state` as of `version`.
    pub fn capture<T: Serialize>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        version: Version,
        state: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            version,
            timestamp: Utc::now(),
            state: serde_json::to_value(state)?,
        })
    }

    /// Restores the captured state.
    pub fn restore<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Balance {
        cents: i64,
        entries: usize,
    }

    #[test]
    fn capture_and_restore() {
        let id = AggregateId::new();
        let state = Balance {
            cents: 4200,
            entries: 3,
        };

        let snapshot = Snapshot::capture(id, "Wallet", Version::new(3), &state).unwrap();
        assert_eq!(snapshot.aggregate_type, "Wallet");
        assert_eq!(snapshot.version, Version::new(3));

        let restored: Balance = snapshot.restore().unwrap();
        assert_eq!(restored, state);
    }
}

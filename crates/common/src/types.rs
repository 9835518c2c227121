use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an aggregate instance.
///
/// Orders, wallets, delivery assignments, commission entries and
/// reconciliation tasks all live in the same event log, so every one of
/// them is addressed by an `AggregateId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(Uuid);

impl AggregateId {
    /// Creates a new random aggregate ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an aggregate ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Derives a stable child ID scoped under this one.
    ///
    /// The same `(self, scope)` pair always yields the same ID, which lets
    /// "one per order" aggregates (assignment, commission) be addressed
    /// without a secondary index.
    pub fn derive(&self, scope: &str) -> Self {
        Self(Uuid::new_v5(&self.0, scope.as_bytes()))
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AggregateId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for AggregateId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<AggregateId> for Uuid {
    fn from(id: AggregateId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_id_new_creates_unique_ids() {
        let id1 = AggregateId::new();
        let id2 = AggregateId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn derived_ids_are_stable_per_scope() {
        let order_id = AggregateId::new();
        assert_eq!(order_id.derive("commission"), order_id.derive("commission"));
        assert_ne!(
            order_id.derive("commission"),
            order_id.derive("delivery-assignment")
        );
        assert_ne!(order_id.derive("commission"), order_id);
    }

    #[test]
    fn parses_from_string() {
        let id = AggregateId::new();
        let parsed: AggregateId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<AggregateId>().is_err());
    }
}

//! Core projection trait and position tracking.

use async_trait::async_trait;
use event_store::EventEnvelope;

use crate::Result;

/// How far into the global event log a projection has read.
///
/// Events a projection ignores still count, so the position always equals
/// the index of the last event offered to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProjectionPosition {
    pub events_processed: u64,
}

impl ProjectionPosition {
    pub fn zero() -> Self {
        Self {
            events_processed: 0,
        }
    }

    pub fn advance(&self) -> Self {
        Self {
            events_processed: self.events_processed + 1,
        }
    }

    /// True if the event at 1-based `index` has not been offered yet.
    pub fn is_behind(&self, index: u64) -> bool {
        self.events_processed < index
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "position({})", self.events_processed)
    }
}

/// Folds stored events into a read model.
///
/// Implementations must advance their position for every event they are
/// handed, including aggregate types they do not care about.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    async fn position(&self) -> ProjectionPosition;

    /// Clears the read model and rewinds to zero.
    async fn reset(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_starts_at_zero() {
        assert_eq!(ProjectionPosition::zero().events_processed, 0);
    }

    #[test]
    fn position_advances() {
        let pos = ProjectionPosition::zero().advance().advance();
        assert_eq!(pos.events_processed, 2);
    }

    #[test]
    fn position_is_behind_unseen_events() {
        let pos = ProjectionPosition {
            events_processed: 3,
        };
        assert!(!pos.is_behind(3));
        assert!(pos.is_behind(4));
    }

    #[test]
    fn position_display() {
        let pos = ProjectionPosition {
            events_processed: 42,
        };
        assert_eq!(pos.to_string(), "position(42)");
    }
}

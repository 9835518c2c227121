//! Projection error types.

use thiserror::Error;

/// Errors raised while feeding events to projections.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// A stored payload did not decode into the expected domain event.
    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("Projection {projection} failed: {message}")]
    Projection {
        projection: &'static str,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, ProjectionError>;

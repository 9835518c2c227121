//! Query access to read models.

use async_trait::async_trait;

/// A denormalized view that handlers can query without touching the store.
#[async_trait]
pub trait ReadModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of top-level entries (orders, recipients).
    async fn count(&self) -> usize;
}

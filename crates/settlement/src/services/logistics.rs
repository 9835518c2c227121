use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::AggregateId;
use domain::FulfillmentState;

use super::Faults;
use crate::error::Result;

const SERVICE: &str = "logistics";

/// Receives order status pushes. Pushing the same state twice is harmless.
#[async_trait]
pub trait LogisticsNotifier: Send + Sync {
    async fn push_status(&self, order_id: AggregateId, state: FulfillmentState) -> Result<()>;
}

/// Records the states pushed per order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLogistics {
    pushes: Arc<RwLock<HashMap<AggregateId, Vec<FulfillmentState>>>>,
    faults: Faults,
}

impl InMemoryLogistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distinct states received for `order_id`, in arrival order.
    pub fn pushes_for(&self, order_id: AggregateId) -> Vec<FulfillmentState> {
        let pushes = self.pushes.read().unwrap_or_else(PoisonError::into_inner);
        pushes.get(&order_id).cloned().unwrap_or_default()
    }

    pub fn push_count(&self) -> usize {
        let pushes = self.pushes.read().unwrap_or_else(PoisonError::into_inner);
        pushes.values().map(Vec::len).sum()
    }

    pub fn refuse_next(&self, calls: u32) {
        self.faults.refuse_next(calls);
    }

    pub fn drop_responses(&self, calls: u32) {
        self.faults.drop_responses(calls);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.set_unavailable(unavailable);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.faults.set_delay(delay);
    }
}

#[async_trait]
impl LogisticsNotifier for InMemoryLogistics {
    async fn push_status(&self, order_id: AggregateId, state: FulfillmentState) -> Result<()> {
        self.faults.before_call(SERVICE).await?;
        {
            let mut pushes = self.pushes.write().unwrap_or_else(PoisonError::into_inner);
            let states = pushes.entry(order_id).or_default();
            if !states.contains(&state) {
                states.push(state);
            }
        }
        self.faults.after_call(SERVICE)
    }
}

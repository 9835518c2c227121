//! Remote collaborators the coordinator calls, with in-memory implementations.
//!
//! The in-memory implementations accept injected failures so retry and
//! reconciliation paths can be exercised without a network.

pub mod coupon;
pub mod ledger;
pub mod logistics;

pub use coupon::{CouponCatalog, InMemoryCouponCatalog};
pub use ledger::{LedgerClient, LocalLedger};
pub use logistics::{InMemoryLogistics, LogisticsNotifier};

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::{Result, SettlementError};

#[derive(Debug, Default)]
struct FaultState {
    /// Calls to refuse before the next one goes through.
    refuse_next: u32,
    /// Calls whose effect is applied but whose response is lost.
    drop_responses: u32,
    unavailable: bool,
    delay: Option<Duration>,
}

/// Failure injection shared by the in-memory collaborators.
#[derive(Debug, Clone, Default)]
pub(crate) struct Faults {
    state: Arc<Mutex<FaultState>>,
}

impl Faults {
    fn with_state<T>(&self, f: impl FnOnce(&mut FaultState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    pub(crate) fn refuse_next(&self, calls: u32) {
        self.with_state(|s| s.refuse_next = calls);
    }

    pub(crate) fn drop_responses(&self, calls: u32) {
        self.with_state(|s| s.drop_responses = calls);
    }

    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.with_state(|s| s.unavailable = unavailable);
    }

    pub(crate) fn set_delay(&self, delay: Option<Duration>) {
        self.with_state(|s| s.delay = delay);
    }

    /// Called before the effect. Sleeps for the configured delay, then
    /// fails if the service is down or still refusing calls.
    pub(crate) async fn before_call(&self, service: &'static str) -> Result<()> {
        let delay = self.with_state(|s| s.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.with_state(|s| {
            if s.unavailable {
                return Err(SettlementError::remote(service, "service unavailable"));
            }
            if s.refuse_next > 0 {
                s.refuse_next -= 1;
                return Err(SettlementError::remote(service, "connection refused"));
            }
            Ok(())
        })
    }

    /// Called after the effect was applied.
    pub(crate) fn after_call(&self, service: &'static str) -> Result<()> {
        self.with_state(|s| {
            if s.drop_responses > 0 {
                s.drop_responses -= 1;
                return Err(SettlementError::remote(service, "response lost"));
            }
            Ok(())
        })
    }
}

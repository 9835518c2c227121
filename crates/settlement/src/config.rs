use domain::CommissionRate;

use crate::retry::RetryPolicy;

/// Tunables of the settlement coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettlementConfig {
    pub commission_rate: CommissionRate,
    pub retry: RetryPolicy,
}

impl SettlementConfig {
    pub fn new(commission_rate: CommissionRate, retry: RetryPolicy) -> Self {
        Self {
            commission_rate,
            retry,
        }
    }
}

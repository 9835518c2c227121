//! Agent commission on delivered orders.
//!
//! One entry per order, recorded when the order reaches DELIVERED. The
//! amount is `rate × final_amount`, rounded down to the cent.

mod aggregate;
mod service;

pub use aggregate::{CommissionEntry, CommissionEvent, CommissionRecordedData, CommissionState};
pub use service::CommissionService;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::money::Money;
use crate::order::FulfillmentState;

/// Commission rate in basis points (1/100 of a percent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommissionRate(u32);

impl CommissionRate {
    pub const MAX_BPS: u32 = 10_000;

    pub fn from_bps(bps: u32) -> Result<Self, CommissionError> {
        if bps > Self::MAX_BPS {
            return Err(CommissionError::InvalidRate { bps });
        }
        Ok(Self(bps))
    }

    pub fn as_bps(&self) -> u32 {
        self.0
    }

    pub fn apply(&self, amount: Money) -> Money {
        amount.apply_bps(self.0)
    }
}

/// 10%.
impl Default for CommissionRate {
    fn default() -> Self {
        Self(1000)
    }
}

impl std::fmt::Display for CommissionRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

#[derive(Debug, Error)]
pub enum CommissionError {
    #[error("No commission recorded for this order")]
    NotRecorded,

    #[error("Order in state {state} is not deliverable for commission")]
    NotDeliverable { state: FulfillmentState },

    #[error("Delivered order has no agent")]
    NoAgent,

    #[error("Commission already paid")]
    AlreadyPaid,

    #[error("Invalid commission rate: {bps} bps (max 10000)")]
    InvalidRate { bps: u32 },
}

impl CommissionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommissionError::NotRecorded => ErrorKind::NotFound,
            CommissionError::NotDeliverable { .. }
            | CommissionError::NoAgent
            | CommissionError::AlreadyPaid => ErrorKind::InvalidTransition,
            CommissionError::InvalidRate { .. } => ErrorKind::Validation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rate_is_ten_percent() {
        let rate = CommissionRate::default();
        assert_eq!(rate.as_bps(), 1000);
        assert_eq!(rate.apply(Money::from_cents(9000)).cents(), 900);
        assert_eq!(rate.to_string(), "10.00%");
    }

    #[test]
    fn test_rate_rounds_down() {
        let rate = CommissionRate::from_bps(1250).unwrap();
        assert_eq!(rate.apply(Money::from_cents(999)).cents(), 124);
    }

    #[test]
    fn test_rate_bounds() {
        assert!(CommissionRate::from_bps(10_000).is_ok());
        assert!(matches!(
            CommissionRate::from_bps(10_001),
            Err(CommissionError::InvalidRate { bps: 10_001 })
        ));
    }
}

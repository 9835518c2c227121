//! Coupon catalog owned by the vendor domain.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{AggregateId, VendorId};
use domain::{Coupon, CouponValidation, Money};

use super::Faults;
use crate::error::{Result, SettlementError};

const SERVICE: &str = "coupon catalog";

/// Remote discount checks and post-payment redemption.
#[async_trait]
pub trait CouponCatalog: Send + Sync {
    /// Read-only check of `code` for an order from `vendor_id`.
    async fn validate(
        &self,
        vendor_id: VendorId,
        code: &str,
        subtotal: Money,
    ) -> Result<CouponValidation>;

    /// Counts one use of `code` by `order_id`. Redeeming twice for the same
    /// order counts once.
    async fn redeem(&self, code: &str, order_id: AggregateId) -> Result<()>;
}

#[derive(Debug, Default)]
struct CatalogState {
    coupons: HashMap<String, Coupon>,
    redeemed_by: HashMap<String, HashSet<AggregateId>>,
}

/// In-memory coupon catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCouponCatalog {
    state: Arc<RwLock<CatalogState>>,
    faults: Faults,
}

impl InMemoryCouponCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_coupon(&self, coupon: Coupon) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.coupons.insert(coupon.code.clone(), coupon);
    }

    pub fn coupon(&self, code: &str) -> Option<Coupon> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.coupons.get(code).cloned()
    }

    pub fn redemptions(&self, code: &str) -> u32 {
        self.coupon(code).map(|c| c.redemptions).unwrap_or(0)
    }

    /// Fails the next `calls` calls with a remote error.
    pub fn refuse_next(&self, calls: u32) {
        self.faults.refuse_next(calls);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.set_unavailable(unavailable);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.faults.set_delay(delay);
    }
}

#[async_trait]
impl CouponCatalog for InMemoryCouponCatalog {
    async fn validate(
        &self,
        vendor_id: VendorId,
        code: &str,
        subtotal: Money,
    ) -> Result<CouponValidation> {
        self.faults.before_call(SERVICE).await?;

        Ok(self
            .coupon(code)
            .map(|coupon| coupon.validate(vendor_id, subtotal, Utc::now()))
            .unwrap_or_else(CouponValidation::invalid))
    }

    async fn redeem(&self, code: &str, order_id: AggregateId) -> Result<()> {
        self.faults.before_call(SERVICE).await?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.coupons.contains_key(code) {
            return Err(SettlementError::InvalidCoupon {
                code: code.to_string(),
            });
        }

        let first_use = state
            .redeemed_by
            .entry(code.to_string())
            .or_default()
            .insert(order_id);
        if first_use && let Some(coupon) = state.coupons.get_mut(code) {
            coupon.redemptions += 1;
        }
        drop(state);

        self.faults.after_call(SERVICE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use domain::Discount;

    fn catalog_with(vendor: VendorId) -> InMemoryCouponCatalog {
        let catalog = InMemoryCouponCatalog::new();
        let now = Utc::now();
        catalog.add_coupon(
            Coupon::new(
                "SAVE10",
                vendor,
                Discount::Fixed(Money::from_cents(1000)),
                now - ChronoDuration::days(1),
                now + ChronoDuration::days(1),
            )
            .with_max_redemptions(1),
        );
        catalog
    }

    #[tokio::test]
    async fn test_validate_known_and_unknown() {
        let vendor = VendorId::new();
        let catalog = catalog_with(vendor);

        let ok = catalog
            .validate(vendor, "SAVE10", Money::from_dollars(100))
            .await
            .unwrap();
        assert_eq!(ok, CouponValidation::valid(Money::from_dollars(10)));

        let unknown = catalog
            .validate(vendor, "NOPE", Money::from_dollars(100))
            .await
            .unwrap();
        assert!(!unknown.valid);
    }

    #[tokio::test]
    async fn test_redeem_once_per_order() {
        let vendor = VendorId::new();
        let catalog = catalog_with(vendor);
        let order_id = AggregateId::new();

        catalog.redeem("SAVE10", order_id).await.unwrap();
        catalog.redeem("SAVE10", order_id).await.unwrap();
        assert_eq!(catalog.redemptions("SAVE10"), 1);

        // The single slot is used up.
        let after = catalog
            .validate(vendor, "SAVE10", Money::from_dollars(100))
            .await
            .unwrap();
        assert!(!after.valid);
    }

    #[tokio::test]
    async fn test_validation_does_not_consume() {
        let vendor = VendorId::new();
        let catalog = catalog_with(vendor);
        for _ in 0..3 {
            catalog
                .validate(vendor, "SAVE10", Money::from_dollars(100))
                .await
                .unwrap();
        }
        assert_eq!(catalog.redemptions("SAVE10"), 0);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let vendor = VendorId::new();
        let catalog = catalog_with(vendor);
        catalog.set_unavailable(true);

        let err = catalog
            .validate(vendor, "SAVE10", Money::from_dollars(100))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}

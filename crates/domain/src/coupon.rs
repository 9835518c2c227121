//! Vendor coupons and the read-only discount check.

use chrono::{DateTime, Utc};
use common::VendorId;
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// How a coupon reduces the order total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Discount {
    /// A fixed amount off.
    Fixed(Money),
    /// A whole percentage off, capped at 100.
    Percent(u8),
}

impl Discount {
    /// Discount on `subtotal`, never more than the subtotal itself.
    pub fn amount_for(&self, subtotal: Money) -> Money {
        if !subtotal.is_positive() {
            return Money::zero();
        }
        let raw = match *self {
            Discount::Fixed(amount) => amount.max(Money::zero()),
            Discount::Percent(pct) => subtotal.apply_bps(u32::from(pct.min(100)) * 100),
        };
        raw.clamp_to(subtotal)
    }
}

/// A vendor-issued discount code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub vendor_id: VendorId,
    pub discount: Discount,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// `None` means unlimited.
    pub max_redemptions: Option<u32>,
    pub redemptions: u32,
}

/// Outcome of a coupon check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponValidation {
    pub valid: bool,
    pub discount_value: Option<Money>,
}

impl CouponValidation {
    pub fn valid(discount_value: Money) -> Self {
        Self {
            valid: true,
            discount_value: Some(discount_value),
        }
    }

    pub fn invalid() -> Self {
        Self {
            valid: false,
            discount_value: None,
        }
    }
}

impl Coupon {
    pub fn new(
        code: impl Into<String>,
        vendor_id: VendorId,
        discount: Discount,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Self {
        Self {
            code: code.into(),
            vendor_id,
            discount,
            starts_at,
            ends_at,
            max_redemptions: None,
            redemptions: 0,
        }
    }

    pub fn with_max_redemptions(mut self, max: u32) -> Self {
        self.max_redemptions = Some(max);
        self
    }

    /// True when `now` falls inside `[starts_at, ends_at]`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now <= self.ends_at
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_redemptions
            .is_some_and(|max| self.redemptions >= max)
    }

    /// Checks the coupon for an order of `subtotal` from `vendor_id`.
    ///
    /// Never fails: a coupon from another vendor, outside its window or
    /// out of redemptions is simply invalid.
    pub fn validate(
        &self,
        vendor_id: VendorId,
        subtotal: Money,
        now: DateTime<Utc>,
    ) -> CouponValidation {
        if self.vendor_id != vendor_id || !self.is_active_at(now) || self.is_exhausted() {
            return CouponValidation::invalid();
        }
        CouponValidation::valid(self.discount.amount_for(subtotal))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn coupon(vendor: VendorId, discount: Discount) -> Coupon {
        let now = Utc::now();
        Coupon::new(
            "SAVE10",
            vendor,
            discount,
            now - Duration::days(1),
            now + Duration::days(1),
        )
    }

    #[test]
    fn fixed_discount_applies() {
        let vendor = VendorId::new();
        let c = coupon(vendor, Discount::Fixed(Money::from_cents(1000)));
        let result = c.validate(vendor, Money::from_cents(10_000), Utc::now());
        assert_eq!(result, CouponValidation::valid(Money::from_cents(1000)));
    }

    #[test]
    fn percent_discount_applies() {
        let vendor = VendorId::new();
        let c = coupon(vendor, Discount::Percent(15));
        let result = c.validate(vendor, Money::from_cents(2000), Utc::now());
        assert_eq!(result.discount_value, Some(Money::from_cents(300)));
    }

    #[test]
    fn discount_is_clamped_to_subtotal() {
        assert_eq!(
            Discount::Fixed(Money::from_cents(5000)).amount_for(Money::from_cents(1200)),
            Money::from_cents(1200)
        );
        assert_eq!(
            Discount::Percent(250).amount_for(Money::from_cents(800)),
            Money::from_cents(800)
        );
    }

    #[test]
    fn other_vendor_is_invalid() {
        let c = coupon(VendorId::new(), Discount::Percent(10));
        let result = c.validate(VendorId::new(), Money::from_cents(1000), Utc::now());
        assert!(!result.valid);
        assert!(result.discount_value.is_none());
    }

    #[test]
    fn outside_window_is_invalid() {
        let vendor = VendorId::new();
        let c = coupon(vendor, Discount::Percent(10));
        assert!(
            !c.validate(vendor, Money::from_cents(1000), Utc::now() + Duration::days(2))
                .valid
        );
        assert!(
            !c.validate(vendor, Money::from_cents(1000), Utc::now() - Duration::days(2))
                .valid
        );
    }

    #[test]
    fn exhausted_coupon_is_invalid() {
        let vendor = VendorId::new();
        let mut c = coupon(vendor, Discount::Percent(10)).with_max_redemptions(1);
        assert!(c.validate(vendor, Money::from_cents(1000), Utc::now()).valid);

        c.redemptions = 1;
        assert!(!c.validate(vendor, Money::from_cents(1000), Utc::now()).valid);
    }
}

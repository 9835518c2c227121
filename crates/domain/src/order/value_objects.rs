//! Value objects for the order domain.

use chrono::{DateTime, Utc};
use common::Actor;
use serde::{Deserialize, Serialize};

use crate::money::Money;

use super::{FulfillmentState, ReturnDecision, ReturnState};

/// Catalog product identifier (SKU).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A product line on an order, priced at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            unit_price,
            quantity,
        }
    }

    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    /// Line total, or `None` when it does not fit in an amount.
    pub fn checked_total_price(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// Where the order is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub street: String,
    pub city: String,
    #[serde(default)]
    pub postal_code: Option<String>,
    pub country: String,
}

impl DeliveryAddress {
    pub fn new(
        street: impl Into<String>,
        city: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            street: street.into(),
            city: city.into(),
            postal_code: None,
            country: country.into(),
        }
    }

    /// Name of the first required field that is blank, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("street", &self.street),
            ("city", &self.city),
            ("country", &self.country),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

/// How the buyer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Settled by the payment gateway callback.
    #[default]
    Card,
    /// Debited from the buyer's wallet at checkout.
    Wallet,
    /// Paid to the agent on delivery.
    CashOnDelivery,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::CashOnDelivery => "cash_on_delivery",
        }
    }
}

/// One entry of an order's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub state: FulfillmentState,
    pub at: DateTime<Utc>,
    pub actor: Actor,
}

/// A buyer's request to return a delivered order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub reason: String,
    pub state: ReturnState,
    pub requested_at: DateTime<Utc>,
    /// Set once; a resolved request never changes its decision.
    pub decision: Option<ReturnDecision>,
    pub refund_amount: Option<Money>,
    pub resolved_by: Option<Actor>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ReturnRequest {
    pub fn is_resolved(&self) -> bool {
        self.decision.is_some()
    }
}

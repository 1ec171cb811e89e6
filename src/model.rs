//! Backend-agnostic domain values.
//!
//! Nothing in here knows about protobuf or GraphQL. Values are built once by the
//! service clients and shared read-only (behind `Arc`) while a query resolves.

use std::fmt;
use std::num::NonZeroU32;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// A monetary amount in integer minor units (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor_units(units: i64) -> Self {
        Money(units)
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_mul(self, quantity: Quantity) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity.get())).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

/// A strictly positive item count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(NonZeroU32);

impl Quantity {
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl TryFrom<i64> for Quantity {
    type Error = ServiceError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value <= 0 {
            return Err(ServiceError::invalid_argument(format!(
                "quantity must be positive, got {value}"
            )));
        }
        u32::try_from(value)
            .ok()
            .and_then(NonZeroU32::new)
            .map(Quantity)
            .ok_or_else(|| {
                ServiceError::invalid_argument(format!(
                    "quantity {value} is out of range, at most {} per line",
                    u32::MAX
                ))
            })
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.get()
    }
}

/// Catalog details captured on an ordered product at the time the order was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSnapshot {
    pub name: String,
    pub description: String,
    pub price: Money,
}

/// A product line inside an order.
///
/// A *requested* line carries only the product id and quantity; an *enriched* line
/// also carries the catalog snapshot the order backend returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedProduct {
    pub product_id: String,
    pub quantity: Quantity,
    pub snapshot: Option<ProductSnapshot>,
}

impl OrderedProduct {
    pub fn requested(product_id: impl Into<String>, quantity: Quantity) -> Self {
        OrderedProduct {
            product_id: product_id.into(),
            quantity,
            snapshot: None,
        }
    }

    pub fn enriched(
        product_id: impl Into<String>,
        quantity: Quantity,
        snapshot: ProductSnapshot,
    ) -> Self {
        OrderedProduct {
            product_id: product_id.into(),
            quantity,
            snapshot: Some(snapshot),
        }
    }

    pub fn is_enriched(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn line_total(&self) -> Option<Money> {
        self.snapshot
            .as_ref()
            .and_then(|s| s.price.checked_mul(self.quantity))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Fixed when the order was placed; later catalog price changes never touch it.
    pub total_price: Money,
    pub account_id: String,
    pub products: Vec<OrderedProduct>,
}

/// Orders of an account are resolved on demand and therefore not stored here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: Option<u64>,
}

/// A product line as submitted by a client, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderItemInput {
    #[serde(alias = "id", alias = "productId")]
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub skip: u64,
    pub take: u64,
}

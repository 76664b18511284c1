use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SellerId(pub String);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category_id: CategoryId,
    pub seller_id: SellerId,
    pub price: Decimal,
    pub discounted_price: Option<Decimal>,
    pub rating: f64,
    pub review_count: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Percentage off the list price, `0.0` when there is no discounted price
    /// or the list price is not positive.
    pub fn discount_percentage(&self) -> f64 {
        let Some(discounted) = self.discounted_price else {
            return 0.0;
        };
        if self.price <= Decimal::ZERO {
            return 0.0;
        }

        let pct = (self.price - discounted) / self.price * Decimal::ONE_HUNDRED;
        pct.to_f64().unwrap_or(0.0)
    }

    /// Price the customer actually pays.
    pub fn effective_price(&self) -> Decimal {
        self.discounted_price.unwrap_or(self.price)
    }

    pub fn shares_affinity_with(&self, other: &Product) -> bool {
        self.category_id == other.category_id || self.seller_id == other.seller_id
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use thiserror::Error;

use echoshop_core::domain::order::{CartItem, Order, OrderId};
use echoshop_core::domain::product::{Category, CategoryId, Product, ProductId, SellerId};
use echoshop_core::domain::user::UserId;
use echoshop_core::recommendations::StoreError;

pub mod cart;
pub mod interaction;
pub mod order;
pub mod product;
pub mod recommendation;

pub use cart::SqlCartRepository;
pub use interaction::SqlInteractionLog;
pub use order::SqlOrderRepository;
pub use product::SqlProductRepository;
pub use recommendation::SqlRecommendationStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid record: {0}")]
    Invalid(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(error) => StoreError::Query(error.to_string()),
            RepositoryError::Decode(message) | RepositoryError::Invalid(message) => {
                StoreError::Decode(message)
            }
        }
    }
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError>;
    async fn save(&self, product: Product) -> Result<(), RepositoryError>;
    async fn save_category(&self, category: Category) -> Result<(), RepositoryError>;
    async fn list_active(
        &self,
        category: Option<&CategoryId>,
        limit: usize,
    ) -> Result<Vec<Product>, RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists an order and its lines in one transaction and clears the
    /// ordered products from the buyer's cart.
    async fn place(&self, order: Order) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;
    async fn list_for_user(&self, user: &UserId, limit: usize)
        -> Result<Vec<Order>, RepositoryError>;
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Inserts the item or replaces the quantity of an existing line.
    async fn add(&self, item: CartItem) -> Result<(), RepositoryError>;
    async fn remove(&self, user: &UserId, product: &ProductId) -> Result<bool, RepositoryError>;
    async fn list(&self, user: &UserId) -> Result<Vec<CartItem>, RepositoryError>;
}

pub(crate) const PRODUCT_COLUMNS: &str = "p.id, p.name, p.category_id, p.seller_id, p.price, \
     p.discounted_price, p.rating, p.review_count, p.is_active, p.created_at";

/// Fixed-width RFC 3339 text so stored timestamps compare lexically.
pub(crate) fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

pub(crate) fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

pub(crate) fn decode<T>(result: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    result.map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn row_to_product(row: &sqlx::sqlite::SqliteRow) -> Result<Product, RepositoryError> {
    let id: String = decode(row.try_get("id"))?;
    let name: String = decode(row.try_get("name"))?;
    let category_id: String = decode(row.try_get("category_id"))?;
    let seller_id: String = decode(row.try_get("seller_id"))?;
    let price_str: String = decode(row.try_get("price"))?;
    let discounted_str: Option<String> = decode(row.try_get("discounted_price"))?;
    let rating: f64 = decode(row.try_get("rating"))?;
    let review_count: i64 = decode(row.try_get("review_count"))?;
    let is_active: bool = decode(row.try_get("is_active"))?;
    let created_at_str: String = decode(row.try_get("created_at"))?;

    let price = Decimal::from_str(&price_str)
        .map_err(|e| RepositoryError::Decode(format!("invalid price `{price_str}`: {e}")))?;
    let discounted_price = discounted_str
        .map(|raw| {
            Decimal::from_str(&raw).map_err(|e| {
                RepositoryError::Decode(format!("invalid discounted price `{raw}`: {e}"))
            })
        })
        .transpose()?;
    let review_count = u32::try_from(review_count)
        .map_err(|_| RepositoryError::Decode(format!("review count out of range: {review_count}")))?;

    Ok(Product {
        id: ProductId(id),
        name,
        category_id: CategoryId(category_id),
        seller_id: SellerId(seller_id),
        price,
        discounted_price,
        rating,
        review_count,
        is_active,
        created_at: parse_timestamp(&created_at_str)?,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Duration, Utc};
    use rust_decimal::Decimal;

    use echoshop_core::domain::product::{Category, CategoryId, Product, ProductId, SellerId};

    use super::{ProductRepository, SqlProductRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    pub async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    pub fn product(id: &str, category: &str, seller: &str, rating: f64) -> Product {
        Product {
            id: ProductId(id.to_string()),
            name: format!("Product {id}"),
            category_id: CategoryId(category.to_string()),
            seller_id: SellerId(seller.to_string()),
            price: Decimal::new(2_500, 2),
            discounted_price: None,
            rating,
            review_count: 10,
            is_active: true,
            created_at: days_ago(30),
        }
    }

    pub fn days_ago(days: i64) -> DateTime<Utc> {
        Utc::now() - Duration::days(days)
    }

    /// Saves the product, creating its category first when needed.
    pub async fn insert_product(pool: &DbPool, product: Product) {
        let repo = SqlProductRepository::new(pool.clone());
        repo.save_category(Category {
            id: product.category_id.clone(),
            name: product.category_id.0.clone(),
        })
        .await
        .expect("save category");
        repo.save(product).await.expect("save product");
    }
}

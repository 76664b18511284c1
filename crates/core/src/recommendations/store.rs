use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::product::{CategoryId, Product, ProductId};
use crate::domain::user::UserId;

use super::types::{CategoryPopularity, ExclusionSet};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Read-side queries the recommendation engine needs from the catalog.
///
/// Every product-returning method yields active products only. Methods that
/// take an [`ExclusionSet`] must not return products in it, although the
/// engine re-checks both rules before ranking.
#[async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn product(&self, id: &ProductId) -> Result<Option<Product>, StoreError>;

    /// Distinct products from the user's latest product page views, newest first.
    async fn recently_viewed(&self, user: &UserId, limit: usize)
        -> Result<Vec<Product>, StoreError>;

    /// Distinct products from the user's latest orders, newest first.
    async fn purchased(&self, user: &UserId, limit: usize) -> Result<Vec<Product>, StoreError>;

    async fn cart_products(&self, user: &UserId, limit: usize) -> Result<Vec<Product>, StoreError>;

    /// Category of each product the user recently viewed and purchased, one
    /// entry per interaction, newest first. `per_source_limit` bounds each of
    /// the two histories separately.
    async fn category_history(
        &self,
        user: &UserId,
        per_source_limit: usize,
    ) -> Result<Vec<CategoryId>, StoreError>;

    /// Categories ordered by total order lines across all users.
    async fn popular_categories(&self, limit: usize)
        -> Result<Vec<CategoryPopularity>, StoreError>;

    /// Products sharing a category or seller with any product in `base`,
    /// best rated first.
    async fn similar_products(
        &self,
        base: &[Product],
        exclude: &ExclusionSet,
        limit: usize,
    ) -> Result<Vec<Product>, StoreError>;

    /// The most ordered products since `since`, re-ordered by rating.
    async fn trending(
        &self,
        since: DateTime<Utc>,
        exclude: &ExclusionSet,
        limit: usize,
    ) -> Result<Vec<Product>, StoreError>;

    async fn top_rated(&self, exclude: &ExclusionSet, limit: usize)
        -> Result<Vec<Product>, StoreError>;

    async fn new_arrivals(
        &self,
        exclude: &ExclusionSet,
        limit: usize,
    ) -> Result<Vec<Product>, StoreError>;

    async fn products_in_categories(
        &self,
        categories: &[CategoryId],
        exclude: &ExclusionSet,
        limit: usize,
    ) -> Result<Vec<Product>, StoreError>;
}

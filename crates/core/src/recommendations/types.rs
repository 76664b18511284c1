//! Types shared by the recommendation engine and its store.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::product::{CategoryId, Product, ProductId};
use crate::domain::user::UserId;

/// Every read the engine performs. Candidate strategies double as the
/// provenance tag on ranked products.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    RecentlyViewed,
    Purchased,
    Cart,
    CategoryHistory,
    PopularCategories,
    SimilarToViewed,
    SimilarToPurchased,
    SimilarToProduct,
    Trending,
    NewArrivals,
    CategoryBased,
    TopRated,
}

impl SignalSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RecentlyViewed => "recently_viewed",
            Self::Purchased => "purchased",
            Self::Cart => "cart",
            Self::CategoryHistory => "category_history",
            Self::PopularCategories => "popular_categories",
            Self::SimilarToViewed => "similar_to_viewed",
            Self::SimilarToPurchased => "similar_to_purchased",
            Self::SimilarToProduct => "similar_to_product",
            Self::Trending => "trending",
            Self::NewArrivals => "new_arrivals",
            Self::CategoryBased => "category_based",
            Self::TopRated => "top_rated",
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Products proposed by one retrieval strategy before merging.
#[derive(Clone, Debug, PartialEq)]
pub struct CandidatePool {
    pub strategy: SignalSource,
    pub products: Vec<Product>,
}

impl CandidatePool {
    pub fn new(strategy: SignalSource, products: Vec<Product>) -> Self {
        Self { strategy, products }
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Product ids a user has already seen, iterated in a stable order so they
/// bind to queries deterministically.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExclusionSet(BTreeSet<ProductId>);

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ProductId) -> bool {
        self.0.insert(id)
    }

    pub fn extend_from_products<'a>(&mut self, products: impl IntoIterator<Item = &'a Product>) {
        self.0.extend(products.into_iter().map(|product| product.id.clone()));
    }

    pub fn contains(&self, id: &ProductId) -> bool {
        self.0.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProductId> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ProductId> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = ProductId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Recent activity for one user, each list newest first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserSignals {
    pub viewed: Vec<Product>,
    pub purchased: Vec<Product>,
    pub cart: Vec<Product>,
}

impl UserSignals {
    pub fn exclusion_set(&self) -> ExclusionSet {
        let mut exclude = ExclusionSet::new();
        exclude.extend_from_products(&self.viewed);
        exclude.extend_from_products(&self.purchased);
        exclude.extend_from_products(&self.cart);
        exclude
    }

    pub fn is_empty(&self) -> bool {
        self.viewed.is_empty() && self.purchased.is_empty() && self.cart.is_empty()
    }
}

/// Aggregate row: how many order lines reference products in a category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPopularity {
    pub category_id: CategoryId,
    pub order_count: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredProduct {
    pub product: Product,
    pub score: f64,
    pub source: SignalSource,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub user_id: UserId,
    pub items: Vec<ScoredProduct>,
    /// Reads that failed and were replaced by an empty or fallback result.
    pub degraded_sources: Vec<SignalSource>,
    /// Set when every candidate pool came back empty and top-rated products
    /// were used instead.
    pub used_fallback: bool,
    pub generated_at: DateTime<Utc>,
}

impl RecommendationSet {
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            items: Vec::new(),
            degraded_sources: Vec::new(),
            used_fallback: false,
            generated_at: Utc::now(),
        }
    }

    pub fn products(self) -> Vec<Product> {
        self.items.into_iter().map(|item| item.product).collect()
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded_sources.is_empty()
    }
}

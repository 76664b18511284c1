//! Recommendation engine

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::config::RecommendationConfig;
use crate::domain::product::{CategoryId, Product, ProductId};
use crate::domain::user::UserId;
use crate::errors::ApplicationError;

use super::scoring::{merge_pools, RelevanceScorer, ScoringWeights};
use super::store::{RecommendationStore, StoreError};
use super::types::{
    CandidatePool, ExclusionSet, RecommendationSet, SignalSource, UserSignals,
};
use super::{CATEGORY_HISTORY_LIMIT, DEFAULT_LIMIT, SIGNAL_LIMIT};

#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationSettings {
    pub default_limit: usize,
    pub max_limit: usize,
    pub trending_window: Duration,
    pub preferred_category_limit: usize,
    pub weights: ScoringWeights,
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: 50,
            trending_window: Duration::days(7),
            preferred_category_limit: 5,
            weights: ScoringWeights::default(),
        }
    }
}

impl From<&RecommendationConfig> for RecommendationSettings {
    fn from(config: &RecommendationConfig) -> Self {
        Self {
            default_limit: config.default_limit,
            max_limit: config.max_limit,
            trending_window: Duration::days(i64::from(config.trending_window_days)),
            preferred_category_limit: config.preferred_category_limit,
            weights: ScoringWeights::from(config),
        }
    }
}

/// Sources whose reads failed during one request.
#[derive(Debug, Default)]
struct Degradations {
    sources: Vec<SignalSource>,
}

impl Degradations {
    fn settle<T: Default>(&mut self, source: SignalSource, result: Result<T, StoreError>) -> T {
        match result {
            Ok(value) => value,
            Err(error) => {
                self.record(source, &error);
                T::default()
            }
        }
    }

    fn record(&mut self, source: SignalSource, error: &StoreError) {
        warn!(
            event_name = "recommendations.source.degraded",
            source = %source,
            error = %error,
            "recommendation source failed, continuing without it"
        );
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
    }

    fn absorb(&mut self, other: Degradations) {
        for source in other.sources {
            if !self.sources.contains(&source) {
                self.sources.push(source);
            }
        }
    }
}

/// Builds ranked product recommendations from an injected store.
///
/// Every read is independently fallible: a failing query is logged, recorded
/// in [`RecommendationSet::degraded_sources`] and replaced with an empty or
/// fallback result, so a request always produces an answer.
#[derive(Debug, Clone)]
pub struct RecommendationEngine<S> {
    store: S,
    scorer: RelevanceScorer,
    settings: RecommendationSettings,
}

impl<S: RecommendationStore> RecommendationEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_settings(store, RecommendationSettings::default())
    }

    pub fn with_settings(store: S, settings: RecommendationSettings) -> Self {
        Self { store, scorer: RelevanceScorer::with_weights(settings.weights), settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &RecommendationSettings {
        &self.settings
    }

    pub fn scorer(&self) -> &RelevanceScorer {
        &self.scorer
    }

    /// `None` means the configured default; anything above `max_limit` is clamped.
    pub fn resolve_limit(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.settings.default_limit).min(self.settings.max_limit)
    }

    /// Ranked recommendations for `user`, without scoring detail.
    pub async fn recommend(&self, user: &UserId, limit: Option<usize>) -> Vec<Product> {
        self.recommend_detailed(user, limit).await.products()
    }

    pub async fn recommend_detailed(
        &self,
        user: &UserId,
        limit: Option<usize>,
    ) -> RecommendationSet {
        let limit = self.resolve_limit(limit);
        if limit == 0 {
            return RecommendationSet::empty(user.clone());
        }

        let mut degraded = Degradations::default();
        let mut affinity_degraded = Degradations::default();
        let (signals, categories) = tokio::join!(
            self.collect_signals_into(user, &mut degraded),
            self.preferred_categories_into(
                user,
                self.settings.preferred_category_limit,
                &mut affinity_degraded,
            ),
        );
        degraded.absorb(affinity_degraded);

        let exclude = signals.exclusion_set();
        let since = self.trending_since();

        let (similar_viewed, similar_purchased, trending, new_arrivals, category_based) = tokio::join!(
            self.query_similar(&signals.viewed, &exclude, limit),
            self.query_similar(&signals.purchased, &exclude, limit),
            self.store.trending(since, &exclude, limit),
            self.store.new_arrivals(&exclude, limit),
            self.query_categories(&categories, &exclude, limit),
        );

        let trending = self.settle_trending(trending, &exclude, limit, &mut degraded).await;
        let trending_fell_back = trending.strategy == SignalSource::TopRated;

        let pools = vec![
            CandidatePool::new(
                SignalSource::SimilarToViewed,
                degraded.settle(SignalSource::SimilarToViewed, similar_viewed),
            ),
            CandidatePool::new(
                SignalSource::SimilarToPurchased,
                degraded.settle(SignalSource::SimilarToPurchased, similar_purchased),
            ),
            trending,
            CandidatePool::new(
                SignalSource::NewArrivals,
                degraded.settle(SignalSource::NewArrivals, new_arrivals),
            ),
            CandidatePool::new(
                SignalSource::CategoryBased,
                degraded.settle(SignalSource::CategoryBased, category_based),
            ),
        ];

        let mut candidates = merge_pools(pools, &exclude);
        let mut used_fallback = false;
        if candidates.is_empty() && !trending_fell_back {
            let top_rated =
                degraded.settle(SignalSource::TopRated, self.store.top_rated(&exclude, limit).await);
            candidates =
                merge_pools(vec![CandidatePool::new(SignalSource::TopRated, top_rated)], &exclude);
            used_fallback = !candidates.is_empty();
        }

        let items = self.scorer.rank(candidates, limit);

        info!(
            event_name = "recommendations.generated",
            user_id = %user.0,
            limit,
            returned = items.len(),
            excluded = exclude.len(),
            preferred_categories = categories.len(),
            degraded_sources = degraded.sources.len(),
            used_fallback,
            "recommendations generated"
        );

        RecommendationSet {
            user_id: user.clone(),
            items,
            degraded_sources: degraded.sources,
            used_fallback,
            generated_at: Utc::now(),
        }
    }

    /// Recently viewed, purchased and cart-held products for `user`. A failed
    /// read contributes an empty list.
    pub async fn collect_signals(&self, user: &UserId) -> UserSignals {
        let mut degraded = Degradations::default();
        self.collect_signals_into(user, &mut degraded).await
    }

    /// Up to `limit` categories ranked by how often they appear in the user's
    /// view and purchase history, or the globally most ordered categories when
    /// the user has none.
    pub async fn preferred_categories(&self, user: &UserId, limit: usize) -> Vec<CategoryId> {
        let mut degraded = Degradations::default();
        self.preferred_categories_into(user, limit, &mut degraded).await
    }

    pub async fn similar_to(
        &self,
        base: &[Product],
        exclude: &ExclusionSet,
        limit: usize,
    ) -> Vec<Product> {
        let mut degraded = Degradations::default();
        let similar = self.query_similar(base, exclude, limit).await;
        degraded.settle(SignalSource::SimilarToViewed, similar)
    }

    /// Trending products, or top-rated products when the trending query fails.
    /// The returned pool is tagged with whichever strategy produced it.
    pub async fn trending(&self, exclude: &ExclusionSet, limit: usize) -> CandidatePool {
        let mut degraded = Degradations::default();
        if limit == 0 {
            return CandidatePool::new(SignalSource::Trending, Vec::new());
        }
        let result = self.store.trending(self.trending_since(), exclude, limit).await;
        self.settle_trending(result, exclude, limit, &mut degraded).await
    }

    pub async fn new_arrivals(&self, exclude: &ExclusionSet, limit: usize) -> Vec<Product> {
        let mut degraded = Degradations::default();
        if limit == 0 {
            return Vec::new();
        }
        degraded.settle(SignalSource::NewArrivals, self.store.new_arrivals(exclude, limit).await)
    }

    pub async fn category_based(
        &self,
        categories: &[CategoryId],
        exclude: &ExclusionSet,
        limit: usize,
    ) -> Vec<Product> {
        let mut degraded = Degradations::default();
        let products = self.query_categories(categories, exclude, limit).await;
        degraded.settle(SignalSource::CategoryBased, products)
    }

    /// Storefront-wide trending list with no per-user exclusions.
    pub async fn trending_products(&self, limit: Option<usize>) -> CandidatePool {
        let limit = self.resolve_limit(limit);
        let exclude = ExclusionSet::new();
        let pool = self.trending(&exclude, limit).await;
        let strategy = pool.strategy;
        let products = merge_pools(vec![pool], &exclude)
            .into_iter()
            .map(|(product, _)| product)
            .take(limit)
            .collect();
        CandidatePool::new(strategy, products)
    }

    /// Products sharing a category or seller with one product, for its detail page.
    pub async fn similar_to_product(
        &self,
        product_id: &ProductId,
        limit: Option<usize>,
    ) -> Result<Vec<Product>, ApplicationError> {
        let limit = self.resolve_limit(limit);
        let product = self
            .store
            .product(product_id)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?
            .ok_or_else(|| ApplicationError::NotFound(format!("product `{}`", product_id.0)))?;

        let exclude: ExclusionSet = [product.id.clone()].into_iter().collect();
        let mut degraded = Degradations::default();
        let similar = degraded.settle(
            SignalSource::SimilarToProduct,
            self.query_similar(std::slice::from_ref(&product), &exclude, limit).await,
        );

        Ok(merge_pools(vec![CandidatePool::new(SignalSource::SimilarToProduct, similar)], &exclude)
            .into_iter()
            .map(|(product, _)| product)
            .take(limit)
            .collect())
    }

    async fn collect_signals_into(
        &self,
        user: &UserId,
        degraded: &mut Degradations,
    ) -> UserSignals {
        let (viewed, purchased, cart) = tokio::join!(
            self.store.recently_viewed(user, SIGNAL_LIMIT),
            self.store.purchased(user, SIGNAL_LIMIT),
            self.store.cart_products(user, SIGNAL_LIMIT),
        );

        UserSignals {
            viewed: active_only(degraded.settle(SignalSource::RecentlyViewed, viewed)),
            purchased: active_only(degraded.settle(SignalSource::Purchased, purchased)),
            cart: active_only(degraded.settle(SignalSource::Cart, cart)),
        }
    }

    async fn preferred_categories_into(
        &self,
        user: &UserId,
        limit: usize,
        degraded: &mut Degradations,
    ) -> Vec<CategoryId> {
        if limit == 0 {
            return Vec::new();
        }

        let history = degraded.settle(
            SignalSource::CategoryHistory,
            self.store.category_history(user, CATEGORY_HISTORY_LIMIT).await,
        );
        if !history.is_empty() {
            return rank_categories(history, limit);
        }

        degraded
            .settle(SignalSource::PopularCategories, self.store.popular_categories(limit).await)
            .into_iter()
            .map(|row| row.category_id)
            .take(limit)
            .collect()
    }

    async fn query_similar(
        &self,
        base: &[Product],
        exclude: &ExclusionSet,
        limit: usize,
    ) -> Result<Vec<Product>, StoreError> {
        if base.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        self.store.similar_products(base, exclude, limit).await
    }

    async fn query_categories(
        &self,
        categories: &[CategoryId],
        exclude: &ExclusionSet,
        limit: usize,
    ) -> Result<Vec<Product>, StoreError> {
        if categories.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        self.store.products_in_categories(categories, exclude, limit).await
    }

    async fn settle_trending(
        &self,
        result: Result<Vec<Product>, StoreError>,
        exclude: &ExclusionSet,
        limit: usize,
        degraded: &mut Degradations,
    ) -> CandidatePool {
        match result {
            Ok(products) => CandidatePool::new(SignalSource::Trending, products),
            Err(error) => {
                degraded.record(SignalSource::Trending, &error);
                let top_rated = degraded
                    .settle(SignalSource::TopRated, self.store.top_rated(exclude, limit).await);
                CandidatePool::new(SignalSource::TopRated, top_rated)
            }
        }
    }

    fn trending_since(&self) -> DateTime<Utc> {
        Utc::now() - self.settings.trending_window
    }
}

/// Orders categories by descending frequency. Ties keep the position of the
/// category's first appearance in `history`.
pub fn rank_categories(history: Vec<CategoryId>, limit: usize) -> Vec<CategoryId> {
    let mut counts: HashMap<CategoryId, (usize, usize)> = HashMap::new();
    for (position, category) in history.into_iter().enumerate() {
        counts.entry(category).and_modify(|(count, _)| *count += 1).or_insert((1, position));
    }

    let mut ranked: Vec<(CategoryId, usize, usize)> =
        counts.into_iter().map(|(category, (count, first))| (category, count, first)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked.into_iter().take(limit).map(|(category, _, _)| category).collect()
}

fn active_only(products: Vec<Product>) -> Vec<Product> {
    products.into_iter().filter(|product| product.is_active).collect()
}

//! Relevance scoring and the merge/dedupe/rank pass.

use std::collections::HashSet;

use crate::config::RecommendationConfig;
use crate::domain::product::{Product, ProductId};

use super::types::{CandidatePool, ExclusionSet, ScoredProduct, SignalSource};
use super::REVIEW_COUNT_CAP;

/// Weights for the linear relevance score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    /// Multiplier for the 0-5 star rating (default: 3.0)
    pub rating: f64,
    /// Multiplier for the discount percentage, 0-100 (default: 2.0)
    pub discount: f64,
    /// Multiplier for review volume, capped and normalised to 0-1 (default: 1.0)
    pub review: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        super::DEFAULT_WEIGHTS
    }
}

impl From<&RecommendationConfig> for ScoringWeights {
    fn from(config: &RecommendationConfig) -> Self {
        Self {
            rating: config.rating_weight,
            discount: config.discount_weight,
            review: config.review_weight,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelevanceScorer {
    weights: ScoringWeights,
}

impl RelevanceScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    pub fn score(&self, product: &Product) -> f64 {
        let review_volume =
            f64::from(product.review_count.min(REVIEW_COUNT_CAP)) / f64::from(REVIEW_COUNT_CAP);

        let total = product.rating * self.weights.rating
            + product.discount_percentage() * self.weights.discount
            + review_volume * self.weights.review;

        if total.is_finite() {
            total
        } else {
            0.0
        }
    }

    /// Scores candidates and returns the best `limit`, highest first.
    ///
    /// The sort is stable, so equal scores keep their merge order.
    pub fn rank(&self, candidates: Vec<(Product, SignalSource)>, limit: usize) -> Vec<ScoredProduct> {
        let mut scored: Vec<ScoredProduct> = candidates
            .into_iter()
            .map(|(product, source)| ScoredProduct { score: self.score(&product), product, source })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        scored
    }
}

/// Concatenates pools in order, dropping excluded and inactive products and
/// keeping only the first occurrence of each product id.
pub fn merge_pools(pools: Vec<CandidatePool>, exclude: &ExclusionSet) -> Vec<(Product, SignalSource)> {
    let mut seen: HashSet<ProductId> = HashSet::new();
    let mut merged = Vec::new();

    for pool in pools {
        for product in pool.products {
            if !product.is_active || exclude.contains(&product.id) {
                continue;
            }
            if seen.insert(product.id.clone()) {
                merged.push((product, pool.strategy));
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{merge_pools, RelevanceScorer, ScoringWeights};
    use crate::domain::product::{CategoryId, Product, ProductId, SellerId};
    use crate::recommendations::types::{CandidatePool, ExclusionSet, SignalSource};

    fn product(id: &str, rating: f64, review_count: u32) -> Product {
        Product {
            id: ProductId(id.to_string()),
            name: format!("Product {id}"),
            category_id: CategoryId("audio".to_string()),
            seller_id: SellerId("seller-1".to_string()),
            price: Decimal::new(10_000, 2),
            discounted_price: None,
            rating,
            review_count,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn score_combines_rating_discount_and_reviews() {
        let scorer = RelevanceScorer::new();
        let mut item = product("p-1", 4.0, 50);
        item.discounted_price = Some(Decimal::new(8_000, 2));

        // 4.0 * 3 + 20.0 * 2 + 0.5 * 1
        assert!((scorer.score(&item) - 52.5).abs() < 1e-9);
    }

    #[test]
    fn review_volume_is_capped_at_one_hundred() {
        let scorer = RelevanceScorer::new();
        let hundred = scorer.score(&product("p-1", 4.0, 100));
        let thousands = scorer.score(&product("p-2", 4.0, 5_000));
        assert_eq!(hundred, thousands);
        assert!((hundred - 13.0).abs() < 1e-9);
    }

    #[test]
    fn custom_weights_are_applied() {
        let scorer =
            RelevanceScorer::with_weights(ScoringWeights { rating: 1.0, discount: 0.0, review: 10.0 });
        assert!((scorer.score(&product("p-1", 2.0, 25)) - 4.5).abs() < 1e-9);
    }

    #[test]
    fn non_finite_scores_collapse_to_zero() {
        let scorer = RelevanceScorer::new();
        assert_eq!(scorer.score(&product("p-1", f64::NAN, 10)), 0.0);
    }

    #[test]
    fn higher_rating_never_ranks_lower() {
        let scorer = RelevanceScorer::new();
        for (low, high) in [(1.0, 1.5), (3.9, 4.0), (0.0, 5.0)] {
            let ranked = scorer.rank(
                vec![
                    (product("low", low, 10), SignalSource::Trending),
                    (product("high", high, 10), SignalSource::Trending),
                ],
                2,
            );
            assert_eq!(ranked[0].product.id.0, "high");
        }
    }

    #[test]
    fn ties_keep_merge_order_and_limit_truncates() {
        let scorer = RelevanceScorer::new();
        let candidates = vec![
            (product("first", 4.0, 10), SignalSource::NewArrivals),
            (product("second", 4.0, 10), SignalSource::CategoryBased),
            (product("third", 1.0, 10), SignalSource::CategoryBased),
        ];

        let ranked = scorer.rank(candidates.clone(), 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].product.id.0, "first");
        assert_eq!(ranked[1].product.id.0, "second");

        let again = scorer.rank(candidates, 2);
        assert_eq!(ranked, again);
    }

    #[test]
    fn merge_drops_duplicates_excluded_and_inactive() {
        let mut inactive = product("inactive", 5.0, 100);
        inactive.is_active = false;

        let pools = vec![
            CandidatePool::new(
                SignalSource::SimilarToViewed,
                vec![product("a", 3.0, 1), product("seen", 5.0, 1)],
            ),
            CandidatePool::new(
                SignalSource::Trending,
                vec![product("a", 3.0, 1), product("b", 4.0, 1), inactive],
            ),
        ];
        let exclude: ExclusionSet = [ProductId("seen".to_string())].into_iter().collect();

        let merged = merge_pools(pools, &exclude);
        let ids: Vec<(&str, SignalSource)> =
            merged.iter().map(|(product, source)| (product.id.0.as_str(), *source)).collect();

        assert_eq!(ids, vec![("a", SignalSource::SimilarToViewed), ("b", SignalSource::Trending)]);
    }
}

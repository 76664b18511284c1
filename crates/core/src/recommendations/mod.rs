//! Product recommendations
//!
//! Blends a shopper's recent views, purchases and cart with category
//! affinity, trending and new products into one ranked, deduplicated list.

mod engine;
mod scoring;
mod store;
mod types;

pub use engine::{rank_categories, RecommendationEngine, RecommendationSettings};
pub use scoring::{merge_pools, RelevanceScorer, ScoringWeights};
pub use store::{RecommendationStore, StoreError};
pub use types::*;

/// Default fixed weights: rating x3, discount percentage x2, review volume x1.
pub const DEFAULT_WEIGHTS: ScoringWeights =
    ScoringWeights { rating: 3.0, discount: 2.0, review: 1.0 };

/// Results returned when the caller does not ask for a specific count.
pub const DEFAULT_LIMIT: usize = 10;

/// Upper bound on each of the viewed, purchased and cart signal sets.
pub const SIGNAL_LIMIT: usize = 20;

/// How many recent views and purchases feed category affinity.
pub const CATEGORY_HISTORY_LIMIT: usize = 50;

/// Review counts above this add nothing to the score.
pub const REVIEW_COUNT_CAP: u32 = 100;

use std::collections::HashSet;

use echoshop_core::domain::interaction::InteractionEvent;
use echoshop_core::domain::product::ProductId;
use echoshop_core::domain::user::UserId;
use echoshop_core::recommendations::{RecommendationEngine, SignalSource};
use echoshop_core::InteractionLog;
use echoshop_db::{
    connect_with_settings, migrations, DbPool, DemoCatalog, SqlInteractionLog,
    SqlRecommendationStore, DEMO_USER_ID,
};

const SEEN_BY_DEMO_USER: &[&str] = &[
    "prod-earbuds",
    "prod-speaker",
    "prod-chef-knife",
    "prod-novel",
    "prod-headphones",
    "prod-lantern",
];

async fn seeded_pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    DemoCatalog::load(&pool).await.expect("seed demo catalog");
    pool
}

fn ids(products: &[echoshop_core::Product]) -> Vec<&str> {
    products.iter().map(|product| product.id.0.as_str()).collect()
}

#[tokio::test]
async fn demo_user_gets_unseen_ranked_products() {
    let engine = RecommendationEngine::new(SqlRecommendationStore::new(seeded_pool().await));

    let set = engine.recommend_detailed(&UserId(DEMO_USER_ID.to_string()), Some(10)).await;
    let returned: Vec<&str> = set.items.iter().map(|item| item.product.id.0.as_str()).collect();

    assert!(set.degraded_sources.is_empty(), "{:?}", set.degraded_sources);
    assert!(!set.used_fallback);
    assert_eq!(returned.len(), 9, "{returned:?}");
    assert_eq!(returned[0], "prod-cookbook");
    for seen in SEEN_BY_DEMO_USER {
        assert!(!returned.contains(seen), "{seen} already seen: {returned:?}");
    }
    assert!(!returned.contains(&"prod-discontinued"));

    let unique: HashSet<&str> = returned.iter().copied().collect();
    assert_eq!(unique.len(), returned.len());

    for pair in set.items.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn repeated_requests_return_the_same_order() {
    let engine = RecommendationEngine::new(SqlRecommendationStore::new(seeded_pool().await));
    let user = UserId(DEMO_USER_ID.to_string());

    let first = engine.recommend(&user, Some(5)).await;
    let second = engine.recommend(&user, Some(5)).await;
    assert_eq!(first.len(), 5);
    assert_eq!(ids(&first), ids(&second));
}

#[tokio::test]
async fn new_shopper_falls_back_to_popular_categories() {
    let engine = RecommendationEngine::new(SqlRecommendationStore::new(seeded_pool().await));
    let newcomer = UserId("user-newcomer".to_string());

    let categories = engine.preferred_categories(&newcomer, 2).await;
    let category_ids: Vec<&str> = categories.iter().map(|id| id.0.as_str()).collect();
    assert_eq!(category_ids, vec!["cat-outdoor", "cat-kitchen"]);

    let products = engine.recommend(&newcomer, None).await;
    assert_eq!(products.len(), 10);
}

#[tokio::test]
async fn new_views_are_excluded_on_the_next_request() {
    let pool = seeded_pool().await;
    let engine = RecommendationEngine::new(SqlRecommendationStore::new(pool.clone()));
    let log = SqlInteractionLog::new(pool);
    let user = UserId(DEMO_USER_ID.to_string());

    let before = engine.recommend(&user, Some(3)).await;
    let top = before[0].id.clone();

    log.append(&InteractionEvent::product_view(Some(user.clone()), &top)).await.expect("track");

    let after = engine.recommend(&user, Some(10)).await;
    assert!(!ids(&after).contains(&top.0.as_str()));
}

#[tokio::test]
async fn trending_and_similar_products_for_the_storefront() {
    let engine = RecommendationEngine::new(SqlRecommendationStore::new(seeded_pool().await));

    let trending = engine.trending_products(Some(3)).await;
    assert_eq!(trending.strategy, SignalSource::Trending);
    assert_eq!(ids(&trending.products), vec!["prod-chef-knife", "prod-skillet", "prod-bottle"]);

    let similar = engine
        .similar_to_product(&ProductId("prod-skillet".to_string()), Some(5))
        .await
        .expect("known product");
    let similar_ids = ids(&similar);
    assert!(!similar_ids.contains(&"prod-skillet"));
    assert_eq!(similar_ids, vec!["prod-chef-knife", "prod-kettle"]);
}

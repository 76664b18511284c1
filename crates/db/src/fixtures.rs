use sqlx::{Executor, QueryBuilder, Sqlite};

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const DEMO_CATEGORY_IDS: &[&str] =
    &["cat-audio", "cat-kitchen", "cat-books", "cat-outdoor", "cat-apparel"];

const DEMO_ACTIVE_PRODUCT_COUNT: i64 = 15;
const DEMO_INACTIVE_PRODUCT_IDS: &[&str] = &["prod-discontinued"];

const DEMO_ORDER_IDS: &[&str] = &[
    "order-demo-001",
    "order-demo-002",
    "order-shopper-001",
    "order-shopper-002",
    "order-shopper-003",
    "order-shopper-004",
];

const DEMO_ORDER_LINE_COUNT: i64 = 10;

const DEMO_EVENT_IDS: &[&str] =
    &["evt-demo-001", "evt-demo-002", "evt-demo-003", "evt-demo-004", "evt-demo-005", "evt-demo-006"];

/// Shopper with views, purchases and a cart line in the demo data.
pub const DEMO_USER_ID: &str = "user-demo";

/// Deterministic storefront used by `echoshop seed`, demos and tests.
pub struct DemoCatalog;

impl DemoCatalog {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_catalog.sql");

    /// Loads the demo catalog. Rows that already exist are left untouched, so
    /// loading twice is harmless.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            categories: DEMO_CATEGORY_IDS.len(),
            products: DEMO_ACTIVE_PRODUCT_COUNT as usize + DEMO_INACTIVE_PRODUCT_IDS.len(),
            orders: DEMO_ORDER_IDS.len(),
            events: DEMO_EVENT_IDS.len(),
            demo_user_id: DEMO_USER_ID,
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let categories = count_ids(pool, "category", "id", DEMO_CATEGORY_IDS).await?;
        checks.push(("categories", categories == DEMO_CATEGORY_IDS.len() as i64));

        let active_products: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM product WHERE is_active = 1")
                .fetch_one(pool)
                .await?;
        checks.push(("active-products", active_products >= DEMO_ACTIVE_PRODUCT_COUNT));

        let inactive = count_ids(pool, "product", "id", DEMO_INACTIVE_PRODUCT_IDS).await?;
        let inactive_flagged: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM product WHERE id = ?1 AND is_active = 0",
        )
        .bind(DEMO_INACTIVE_PRODUCT_IDS[0])
        .fetch_one(pool)
        .await?;
        checks.push(("inactive-product", inactive == 1 && inactive_flagged == 1));

        let orders = count_ids(pool, "customer_order", "id", DEMO_ORDER_IDS).await?;
        checks.push(("orders", orders == DEMO_ORDER_IDS.len() as i64));

        let mut lines_query =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(1) FROM order_item WHERE order_id IN (");
        let mut separated = lines_query.separated(", ");
        for id in DEMO_ORDER_IDS {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        let order_lines = lines_query.build_query_scalar::<i64>().fetch_one(pool).await?;
        checks.push(("order-lines", order_lines == DEMO_ORDER_LINE_COUNT));

        let demo_cart: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM cart_item WHERE user_id = ?1")
                .bind(DEMO_USER_ID)
                .fetch_one(pool)
                .await?;
        checks.push(("demo-cart", demo_cart >= 1));

        let events = count_ids(pool, "analytics_event", "id", DEMO_EVENT_IDS).await?;
        checks.push(("analytics-events", events == DEMO_EVENT_IDS.len() as i64));

        let recent_orders: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM customer_order
             WHERE created_at >= strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '-7 days')",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("recent-orders", recent_orders > 0));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }
}

async fn count_ids(
    pool: &DbPool,
    table: &'static str,
    column: &'static str,
    ids: &[&'static str],
) -> Result<i64, RepositoryError> {
    let mut query =
        QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(1) FROM {table} WHERE {column} IN ("));
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
    Ok(query.build_query_scalar::<i64>().fetch_one(pool).await?)
}

#[derive(Debug)]
pub struct SeedResult {
    pub categories: usize,
    pub products: usize,
    pub orders: usize,
    pub events: usize,
    pub demo_user_id: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_present() {
        assert!(DemoCatalog::SQL.contains("INSERT INTO product"));
    }

    #[tokio::test]
    async fn load_is_verifiable_and_idempotent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");

        let first = DemoCatalog::load(&pool).await.expect("load demo catalog");
        let first_verification = DemoCatalog::verify(&pool).await.expect("verify demo catalog");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first.categories, 5);
        assert_eq!(first.products, 16);

        DemoCatalog::load(&pool).await.expect("reload demo catalog");
        let second_verification = DemoCatalog::verify(&pool).await.expect("re-verify");
        assert!(second_verification.all_present);
        assert_eq!(first_verification.checks, second_verification.checks);
    }

    #[tokio::test]
    async fn verify_fails_on_an_empty_database() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");

        let verification = DemoCatalog::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        assert!(verification.checks.iter().any(|(name, ok)| *name == "categories" && !ok));
    }
}

//! SQLite reads behind the recommendation engine.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite};

use echoshop_core::domain::product::{CategoryId, Product, ProductId};
use echoshop_core::domain::user::UserId;
use echoshop_core::recommendations::{
    CategoryPopularity, ExclusionSet, RecommendationStore, StoreError,
};

use super::{
    decode, format_timestamp, row_to_product, sql_limit, RepositoryError, PRODUCT_COLUMNS,
};
use crate::DbPool;

#[derive(Clone)]
pub struct SqlRecommendationStore {
    pool: DbPool,
}

#[derive(Debug, sqlx::FromRow)]
struct CategoryPopularityRow {
    category_id: String,
    order_count: i64,
}

impl From<CategoryPopularityRow> for CategoryPopularity {
    fn from(row: CategoryPopularityRow) -> Self {
        Self {
            category_id: CategoryId(row.category_id),
            order_count: u64::try_from(row.order_count).unwrap_or_default(),
        }
    }
}

fn push_in_list<'args>(
    builder: &mut QueryBuilder<'args, Sqlite>,
    values: impl IntoIterator<Item = String>,
) {
    builder.push("(");
    let mut separated = builder.separated(", ");
    for value in values {
        separated.push_bind(value);
    }
    separated.push_unseparated(")");
}

fn push_exclusions(builder: &mut QueryBuilder<'_, Sqlite>, exclude: &ExclusionSet) {
    if exclude.is_empty() {
        return;
    }
    builder.push(" AND p.id NOT IN ");
    push_in_list(builder, exclude.iter().map(|id| id.0.clone()));
}

fn active_products() -> QueryBuilder<'static, Sqlite> {
    QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM product p WHERE p.is_active = 1"))
}

impl SqlRecommendationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_products(
        &self,
        mut builder: QueryBuilder<'_, Sqlite>,
    ) -> Result<Vec<Product>, RepositoryError> {
        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_product).collect()
    }

    async fn user_products(
        &self,
        sql: &str,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<Product>, RepositoryError> {
        let rows =
            sqlx::query(sql).bind(&user.0).bind(sql_limit(limit)).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_product).collect()
    }

    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product p WHERE p.id = ? AND p.is_active = 1"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn history(
        &self,
        user: &UserId,
        per_source_limit: usize,
    ) -> Result<Vec<CategoryId>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT category_id FROM (
                 SELECT * FROM (
                     SELECT p.category_id AS category_id, e.occurred_at AS touched_at
                     FROM analytics_event e
                     JOIN product p ON p.id = e.resource_id
                     WHERE e.user_id = ?1 AND e.event_type = 'page_view'
                       AND e.resource_type = 'product'
                     ORDER BY e.occurred_at DESC, e.id ASC
                     LIMIT ?2
                 )
                 UNION ALL
                 SELECT * FROM (
                     SELECT p.category_id AS category_id, o.created_at AS touched_at
                     FROM order_item oi
                     JOIN customer_order o ON o.id = oi.order_id
                     JOIN product p ON p.id = oi.product_id
                     WHERE o.user_id = ?1
                     ORDER BY o.created_at DESC, o.id ASC, oi.line_no ASC
                     LIMIT ?2
                 )
             )
             ORDER BY touched_at DESC, category_id ASC",
        )
        .bind(&user.0)
        .bind(sql_limit(per_source_limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| decode(row.try_get::<String, _>("category_id")).map(CategoryId))
            .collect()
    }

    async fn popular(&self, limit: usize) -> Result<Vec<CategoryPopularity>, RepositoryError> {
        let rows: Vec<CategoryPopularityRow> = sqlx::query_as(
            "SELECT p.category_id AS category_id, COUNT(*) AS order_count
             FROM order_item oi
             JOIN product p ON p.id = oi.product_id
             GROUP BY p.category_id
             ORDER BY order_count DESC, p.category_id ASC
             LIMIT ?",
        )
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CategoryPopularity::from).collect())
    }

    async fn similar(
        &self,
        base: &[Product],
        exclude: &ExclusionSet,
        limit: usize,
    ) -> Result<Vec<Product>, RepositoryError> {
        let categories: BTreeSet<String> =
            base.iter().map(|product| product.category_id.0.clone()).collect();
        let sellers: BTreeSet<String> =
            base.iter().map(|product| product.seller_id.0.clone()).collect();
        if categories.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = active_products();
        builder.push(" AND (p.category_id IN ");
        push_in_list(&mut builder, categories);
        builder.push(" OR p.seller_id IN ");
        push_in_list(&mut builder, sellers);
        builder.push(")");
        push_exclusions(&mut builder, exclude);
        builder.push(" ORDER BY p.rating DESC, p.id ASC LIMIT ");
        builder.push_bind(sql_limit(limit));

        self.fetch_products(builder).await
    }

    async fn trending_since(
        &self,
        since: DateTime<Utc>,
        exclude: &ExclusionSet,
        limit: usize,
    ) -> Result<Vec<Product>, RepositoryError> {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "SELECT * FROM (
                 SELECT {PRODUCT_COLUMNS}, t.order_count AS order_count
                 FROM product p
                 JOIN (
                     SELECT oi.product_id AS product_id, COUNT(*) AS order_count
                     FROM order_item oi
                     JOIN customer_order o ON o.id = oi.order_id
                     WHERE o.created_at >= "
        ));
        builder.push_bind(format_timestamp(&since));
        builder.push(
            " GROUP BY oi.product_id
                 ) t ON t.product_id = p.id
                 WHERE p.is_active = 1",
        );
        push_exclusions(&mut builder, exclude);
        builder.push(" ORDER BY t.order_count DESC, p.id ASC LIMIT ");
        builder.push_bind(sql_limit(limit));
        builder.push(") ORDER BY rating DESC, id ASC");

        self.fetch_products(builder).await
    }

    async fn ordered_catalog(
        &self,
        exclude: &ExclusionSet,
        order_by: &str,
        limit: usize,
    ) -> Result<Vec<Product>, RepositoryError> {
        let mut builder = active_products();
        push_exclusions(&mut builder, exclude);
        builder.push(" ORDER BY ");
        builder.push(order_by);
        builder.push(" LIMIT ");
        builder.push_bind(sql_limit(limit));

        self.fetch_products(builder).await
    }

    async fn in_categories(
        &self,
        categories: &[CategoryId],
        exclude: &ExclusionSet,
        limit: usize,
    ) -> Result<Vec<Product>, RepositoryError> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = active_products();
        builder.push(" AND p.category_id IN ");
        push_in_list(&mut builder, categories.iter().map(|id| id.0.clone()));
        push_exclusions(&mut builder, exclude);
        builder.push(" ORDER BY p.rating DESC, p.id ASC LIMIT ");
        builder.push_bind(sql_limit(limit));

        self.fetch_products(builder).await
    }
}

const RECENTLY_VIEWED_SQL: &str = "SELECT p.id, p.name, p.category_id, p.seller_id, p.price,
            p.discounted_price, p.rating, p.review_count, p.is_active, p.created_at
     FROM (
         SELECT resource_id, MAX(occurred_at) AS last_seen
         FROM analytics_event
         WHERE user_id = ? AND event_type = 'page_view' AND resource_type = 'product'
         GROUP BY resource_id
     ) v
     JOIN product p ON p.id = v.resource_id
     WHERE p.is_active = 1
     ORDER BY v.last_seen DESC, p.id ASC
     LIMIT ?";

const PURCHASED_SQL: &str = "SELECT p.id, p.name, p.category_id, p.seller_id, p.price,
            p.discounted_price, p.rating, p.review_count, p.is_active, p.created_at
     FROM (
         SELECT oi.product_id AS product_id, MAX(o.created_at) AS last_ordered
         FROM order_item oi
         JOIN customer_order o ON o.id = oi.order_id
         WHERE o.user_id = ?
         GROUP BY oi.product_id
     ) b
     JOIN product p ON p.id = b.product_id
     WHERE p.is_active = 1
     ORDER BY b.last_ordered DESC, p.id ASC
     LIMIT ?";

const CART_SQL: &str = "SELECT p.id, p.name, p.category_id, p.seller_id, p.price,
            p.discounted_price, p.rating, p.review_count, p.is_active, p.created_at
     FROM cart_item c
     JOIN product p ON p.id = c.product_id
     WHERE c.user_id = ? AND p.is_active = 1
     ORDER BY c.added_at DESC, p.id ASC
     LIMIT ?";

#[async_trait]
impl RecommendationStore for SqlRecommendationStore {
    async fn product(&self, id: &ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.find_product(id).await?)
    }

    async fn recently_viewed(
        &self,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<Product>, StoreError> {
        Ok(self.user_products(RECENTLY_VIEWED_SQL, user, limit).await?)
    }

    async fn purchased(&self, user: &UserId, limit: usize) -> Result<Vec<Product>, StoreError> {
        Ok(self.user_products(PURCHASED_SQL, user, limit).await?)
    }

    async fn cart_products(&self, user: &UserId, limit: usize) -> Result<Vec<Product>, StoreError> {
        Ok(self.user_products(CART_SQL, user, limit).await?)
    }

    async fn category_history(
        &self,
        user: &UserId,
        per_source_limit: usize,
    ) -> Result<Vec<CategoryId>, StoreError> {
        Ok(self.history(user, per_source_limit).await?)
    }

    async fn popular_categories(
        &self,
        limit: usize,
    ) -> Result<Vec<CategoryPopularity>, StoreError> {
        Ok(self.popular(limit).await?)
    }

    async fn similar_products(
        &self,
        base: &[Product],
        exclude: &ExclusionSet,
        limit: usize,
    ) -> Result<Vec<Product>, StoreError> {
        Ok(self.similar(base, exclude, limit).await?)
    }

    async fn trending(
        &self,
        since: DateTime<Utc>,
        exclude: &ExclusionSet,
        limit: usize,
    ) -> Result<Vec<Product>, StoreError> {
        Ok(self.trending_since(since, exclude, limit).await?)
    }

    async fn top_rated(
        &self,
        exclude: &ExclusionSet,
        limit: usize,
    ) -> Result<Vec<Product>, StoreError> {
        Ok(self
            .ordered_catalog(exclude, "p.rating DESC, p.review_count DESC, p.id ASC", limit)
            .await?)
    }

    async fn new_arrivals(
        &self,
        exclude: &ExclusionSet,
        limit: usize,
    ) -> Result<Vec<Product>, StoreError> {
        Ok(self.ordered_catalog(exclude, "p.created_at DESC, p.id ASC", limit).await?)
    }

    async fn products_in_categories(
        &self,
        categories: &[CategoryId],
        exclude: &ExclusionSet,
        limit: usize,
    ) -> Result<Vec<Product>, StoreError> {
        Ok(self.in_categories(categories, exclude, limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use echoshop_core::domain::interaction::InteractionEvent;
    use echoshop_core::domain::order::{CartItem, Order, OrderId, OrderItem};
    use echoshop_core::domain::product::{CategoryId, Product, ProductId};
    use echoshop_core::domain::user::UserId;
    use echoshop_core::recommendations::{ExclusionSet, RecommendationStore};

    use super::SqlRecommendationStore;
    use crate::repositories::test_support::{days_ago, insert_product, product, setup};
    use crate::repositories::{
        CartRepository, OrderRepository, ProductRepository, SqlCartRepository, SqlInteractionLog,
        SqlOrderRepository, SqlProductRepository,
    };
    use crate::DbPool;

    fn ids(products: &[Product]) -> Vec<&str> {
        products.iter().map(|product| product.id.0.as_str()).collect()
    }

    fn exclude(ids: &[&str]) -> ExclusionSet {
        ids.iter().map(|id| ProductId((*id).to_string())).collect()
    }

    async fn place(pool: &DbPool, id: &str, user: &str, products: &[&str], days: i64) {
        SqlOrderRepository::new(pool.clone())
            .place(Order {
                id: OrderId(id.to_string()),
                user_id: UserId(user.to_string()),
                items: products
                    .iter()
                    .map(|product| OrderItem { product_id: ProductId((*product).into()), quantity: 1 })
                    .collect(),
                created_at: days_ago(days),
            })
            .await
            .expect("place order");
    }

    async fn view(pool: &DbPool, user: &str, product: &str, minutes_ago: i64) {
        let event = InteractionEvent::product_view(
            Some(UserId(user.to_string())),
            &ProductId(product.to_string()),
        )
        .occurred_at(Utc::now() - Duration::minutes(minutes_ago));
        SqlInteractionLog::new(pool.clone()).insert(&event).await.expect("log view");
    }

    /// Six products over three categories and four sellers; `p-6` is inactive.
    async fn catalog() -> DbPool {
        let pool = setup().await;
        insert_product(&pool, product("p-1", "shoes", "s-1", 4.0)).await;
        insert_product(&pool, product("p-2", "shoes", "s-2", 4.5)).await;
        insert_product(&pool, product("p-3", "hats", "s-1", 3.0)).await;
        insert_product(&pool, product("p-4", "hats", "s-3", 4.8)).await;
        let mut newest = product("p-5", "bags", "s-4", 2.0);
        newest.created_at = days_ago(1);
        insert_product(&pool, newest).await;
        let mut retired = product("p-6", "bags", "s-4", 5.0);
        retired.is_active = false;
        insert_product(&pool, retired).await;
        pool
    }

    #[tokio::test]
    async fn recently_viewed_is_distinct_newest_first_and_active() {
        let pool = catalog().await;
        view(&pool, "user-1", "p-1", 30).await;
        view(&pool, "user-1", "p-2", 20).await;
        view(&pool, "user-1", "p-1", 10).await;
        view(&pool, "user-1", "p-6", 5).await;
        view(&pool, "user-2", "p-3", 1).await;

        let store = SqlRecommendationStore::new(pool);
        let viewed =
            store.recently_viewed(&UserId("user-1".to_string()), 20).await.expect("viewed");
        assert_eq!(ids(&viewed), vec!["p-1", "p-2"]);
    }

    #[tokio::test]
    async fn purchases_and_cart_are_user_scoped() {
        let pool = catalog().await;
        place(&pool, "ord-1", "user-1", &["p-3"], 4).await;
        place(&pool, "ord-2", "user-1", &["p-4", "p-3"], 1).await;
        place(&pool, "ord-3", "user-2", &["p-1"], 1).await;
        SqlCartRepository::new(pool.clone())
            .add(CartItem {
                user_id: UserId("user-1".to_string()),
                product_id: ProductId("p-5".to_string()),
                quantity: 1,
                added_at: Utc::now(),
            })
            .await
            .expect("cart");

        let store = SqlRecommendationStore::new(pool);
        let user = UserId("user-1".to_string());
        let purchased = store.purchased(&user, 20).await.expect("purchased");
        assert_eq!(ids(&purchased), vec!["p-3", "p-4"]);

        let cart = store.cart_products(&user, 20).await.expect("cart");
        assert_eq!(ids(&cart), vec!["p-5"]);
    }

    #[tokio::test]
    async fn history_and_popular_categories() {
        let pool = catalog().await;
        view(&pool, "user-1", "p-1", 10).await;
        view(&pool, "user-1", "p-2", 5).await;
        place(&pool, "ord-1", "user-1", &["p-3"], 1).await;
        place(&pool, "ord-2", "user-2", &["p-3", "p-4"], 2).await;
        place(&pool, "ord-3", "user-3", &["p-1"], 3).await;

        let store = SqlRecommendationStore::new(pool);
        let history =
            store.category_history(&UserId("user-1".to_string()), 50).await.expect("history");
        assert_eq!(
            history,
            vec![
                CategoryId("shoes".to_string()),
                CategoryId("shoes".to_string()),
                CategoryId("hats".to_string())
            ]
        );

        let popular = store.popular_categories(5).await.expect("popular");
        assert_eq!(popular[0].category_id.0, "hats");
        assert_eq!(popular[0].order_count, 3);
        assert_eq!(popular[1].category_id.0, "shoes");
        assert_eq!(popular[1].order_count, 1);
    }

    #[tokio::test]
    async fn similar_products_match_category_or_seller_and_honor_exclusions() {
        let pool = catalog().await;
        let base = SqlProductRepository::new(pool.clone())
            .find_by_id(&ProductId("p-1".to_string()))
            .await
            .expect("find")
            .expect("exists");

        let store = SqlRecommendationStore::new(pool);
        let similar =
            store.similar_products(&[base], &exclude(&["p-1"]), 10).await.expect("similar");
        assert_eq!(ids(&similar), vec!["p-2", "p-3"]);
    }

    #[tokio::test]
    async fn trending_takes_most_ordered_then_orders_by_rating() {
        let pool = catalog().await;
        place(&pool, "ord-1", "user-1", &["p-1", "p-3"], 1).await;
        place(&pool, "ord-2", "user-2", &["p-1", "p-3"], 2).await;
        place(&pool, "ord-3", "user-3", &["p-2"], 2).await;
        place(&pool, "ord-4", "user-4", &["p-4"], 30).await;

        let store = SqlRecommendationStore::new(pool);
        let since = Utc::now() - Duration::days(7);

        let top_two = store.trending(since, &ExclusionSet::new(), 2).await.expect("trending");
        assert_eq!(ids(&top_two), vec!["p-1", "p-3"]);

        let all = store.trending(since, &exclude(&["p-1"]), 10).await.expect("trending");
        assert_eq!(ids(&all), vec!["p-2", "p-3"]);
    }

    #[tokio::test]
    async fn catalog_orderings_are_deterministic() {
        let pool = catalog().await;
        let store = SqlRecommendationStore::new(pool);

        let top = store.top_rated(&exclude(&["p-4"]), 3).await.expect("top rated");
        assert_eq!(ids(&top), vec!["p-2", "p-1", "p-3"]);

        let arrivals = store.new_arrivals(&ExclusionSet::new(), 2).await.expect("new arrivals");
        assert_eq!(ids(&arrivals)[0], "p-5");

        let hats = store
            .products_in_categories(&[CategoryId("hats".to_string())], &ExclusionSet::new(), 10)
            .await
            .expect("categories");
        assert_eq!(ids(&hats), vec!["p-4", "p-3"]);

        let retired = store.product(&ProductId("p-6".to_string())).await.expect("lookup");
        assert!(retired.is_none());
    }
}

use echoshop_core::domain::product::{Category, CategoryId, Product, ProductId};

use super::{
    format_timestamp, row_to_product, sql_limit, ProductRepository, RepositoryError,
    PRODUCT_COLUMNS,
};
use crate::DbPool;

pub struct SqlProductRepository {
    pool: DbPool,
}

impl SqlProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn count_active(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar("SELECT COUNT(1) FROM product WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait::async_trait]
impl ProductRepository for SqlProductRepository {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM product p WHERE p.id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_product(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, product: Product) -> Result<(), RepositoryError> {
        if !product.rating.is_finite() || !(0.0..=5.0).contains(&product.rating) {
            return Err(RepositoryError::Invalid(format!(
                "product `{}` rating {} is outside 0-5",
                product.id.0, product.rating
            )));
        }

        sqlx::query(
            "INSERT INTO product (id, name, category_id, seller_id, price, discounted_price,
                                  rating, review_count, is_active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 category_id = excluded.category_id,
                 seller_id = excluded.seller_id,
                 price = excluded.price,
                 discounted_price = excluded.discounted_price,
                 rating = excluded.rating,
                 review_count = excluded.review_count,
                 is_active = excluded.is_active",
        )
        .bind(&product.id.0)
        .bind(&product.name)
        .bind(&product.category_id.0)
        .bind(&product.seller_id.0)
        .bind(product.price.to_string())
        .bind(product.discounted_price.map(|price| price.to_string()))
        .bind(product.rating)
        .bind(i64::from(product.review_count))
        .bind(product.is_active)
        .bind(format_timestamp(&product.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_category(&self, category: Category) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO category (id, name) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        )
        .bind(&category.id.0)
        .bind(&category.name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_active(
        &self,
        category: Option<&CategoryId>,
        limit: usize,
    ) -> Result<Vec<Product>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = if let Some(category) = category {
            sqlx::query(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM product p
                 WHERE p.is_active = 1 AND p.category_id = ?
                 ORDER BY p.name ASC, p.id ASC
                 LIMIT ?"
            ))
            .bind(&category.0)
            .bind(sql_limit(limit))
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM product p
                 WHERE p.is_active = 1
                 ORDER BY p.name ASC, p.id ASC
                 LIMIT ?"
            ))
            .bind(sql_limit(limit))
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(row_to_product).collect::<Result<Vec<_>, _>>()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use echoshop_core::domain::product::{CategoryId, ProductId};

    use super::SqlProductRepository;
    use crate::repositories::test_support::{insert_product, product, setup};
    use crate::repositories::{ProductRepository, RepositoryError};

    #[tokio::test]
    async fn save_and_find_round_trips_money_and_flags() {
        let pool = setup().await;
        let mut item = product("p-1", "audio", "seller-1", 4.5);
        item.price = Decimal::new(19_999, 2);
        item.discounted_price = Some(Decimal::new(14_999, 2));
        insert_product(&pool, item.clone()).await;

        let repo = SqlProductRepository::new(pool);
        let found = repo.find_by_id(&ProductId("p-1".to_string())).await.expect("find");
        let found = found.expect("should exist");

        assert_eq!(found.price, Decimal::new(19_999, 2));
        assert_eq!(found.discounted_price, Some(Decimal::new(14_999, 2)));
        assert_eq!(found.category_id, item.category_id);
        assert!(found.is_active);
        assert_eq!(found.created_at.timestamp_millis(), item.created_at.timestamp_millis());
    }

    #[tokio::test]
    async fn missing_product_is_none() {
        let pool = setup().await;
        let repo = SqlProductRepository::new(pool);
        assert!(repo.find_by_id(&ProductId("nope".to_string())).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn list_active_skips_deactivated_products() {
        let pool = setup().await;
        insert_product(&pool, product("p-1", "audio", "seller-1", 4.0)).await;
        insert_product(&pool, product("p-2", "audio", "seller-2", 3.0)).await;
        insert_product(&pool, product("p-3", "books", "seller-2", 5.0)).await;

        let repo = SqlProductRepository::new(pool);
        let mut retired = product("p-2", "audio", "seller-2", 3.0);
        retired.is_active = false;
        repo.save(retired).await.expect("upsert");

        let all = repo.list_active(None, 10).await.expect("list");
        assert_eq!(all.len(), 2);

        let audio = repo.list_active(Some(&CategoryId("audio".to_string())), 10).await.expect("list");
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0].id.0, "p-1");
        assert_eq!(repo.count_active().await.expect("count"), 2);
    }

    #[tokio::test]
    async fn out_of_range_rating_is_rejected() {
        let pool = setup().await;
        let repo = SqlProductRepository::new(pool);

        let error = repo.save(product("p-1", "audio", "seller-1", 7.5)).await.expect_err("invalid");
        assert!(matches!(error, RepositoryError::Invalid(_)));
    }
}

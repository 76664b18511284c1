use sqlx::Row;

use echoshop_core::domain::order::CartItem;
use echoshop_core::domain::product::ProductId;
use echoshop_core::domain::user::UserId;

use super::{decode, format_timestamp, parse_timestamp, CartRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCartRepository {
    pool: DbPool,
}

impl SqlCartRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_cart_item(row: &sqlx::sqlite::SqliteRow) -> Result<CartItem, RepositoryError> {
    let user_id: String = decode(row.try_get("user_id"))?;
    let product_id: String = decode(row.try_get("product_id"))?;
    let quantity: i64 = decode(row.try_get("quantity"))?;
    let added_at: String = decode(row.try_get("added_at"))?;

    Ok(CartItem {
        user_id: UserId(user_id),
        product_id: ProductId(product_id),
        quantity: u32::try_from(quantity)
            .map_err(|_| RepositoryError::Decode(format!("quantity out of range: {quantity}")))?,
        added_at: parse_timestamp(&added_at)?,
    })
}

#[async_trait::async_trait]
impl CartRepository for SqlCartRepository {
    async fn add(&self, item: CartItem) -> Result<(), RepositoryError> {
        if item.quantity == 0 {
            return Err(RepositoryError::Invalid(format!(
                "cart line for `{}` needs a positive quantity",
                item.product_id.0
            )));
        }

        sqlx::query(
            "INSERT INTO cart_item (user_id, product_id, quantity, added_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id, product_id) DO UPDATE SET
                 quantity = excluded.quantity,
                 added_at = excluded.added_at",
        )
        .bind(&item.user_id.0)
        .bind(&item.product_id.0)
        .bind(i64::from(item.quantity))
        .bind(format_timestamp(&item.added_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, user: &UserId, product: &ProductId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_item WHERE user_id = ? AND product_id = ?")
            .bind(&user.0)
            .bind(&product.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Most recently added first.
    async fn list(&self, user: &UserId) -> Result<Vec<CartItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT user_id, product_id, quantity, added_at FROM cart_item
             WHERE user_id = ?
             ORDER BY added_at DESC, product_id ASC",
        )
        .bind(&user.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_cart_item).collect()
    }
}

#[cfg(test)]
mod tests {
    use echoshop_core::domain::order::CartItem;
    use echoshop_core::domain::product::ProductId;
    use echoshop_core::domain::user::UserId;

    use super::SqlCartRepository;
    use crate::repositories::test_support::{days_ago, insert_product, product, setup};
    use crate::repositories::{CartRepository, RepositoryError};

    fn line(product: &str, quantity: u32, days: i64) -> CartItem {
        CartItem {
            user_id: UserId("user-1".to_string()),
            product_id: ProductId(product.to_string()),
            quantity,
            added_at: days_ago(days),
        }
    }

    #[tokio::test]
    async fn add_upserts_and_list_is_newest_first() {
        let pool = setup().await;
        insert_product(&pool, product("p-1", "audio", "seller-1", 4.0)).await;
        insert_product(&pool, product("p-2", "audio", "seller-1", 4.0)).await;

        let repo = SqlCartRepository::new(pool);
        repo.add(line("p-1", 1, 3)).await.expect("add p-1");
        repo.add(line("p-2", 1, 2)).await.expect("add p-2");
        repo.add(line("p-1", 4, 1)).await.expect("update p-1");

        let items = repo.list(&UserId("user-1".to_string())).await.expect("list");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].product_id.0, "p-1");
        assert_eq!(items[0].quantity, 4);
        assert_eq!(items[1].product_id.0, "p-2");
    }

    #[tokio::test]
    async fn remove_reports_whether_a_line_existed() {
        let pool = setup().await;
        insert_product(&pool, product("p-1", "audio", "seller-1", 4.0)).await;

        let repo = SqlCartRepository::new(pool);
        repo.add(line("p-1", 1, 0)).await.expect("add");

        let user = UserId("user-1".to_string());
        assert!(repo.remove(&user, &ProductId("p-1".to_string())).await.expect("remove"));
        assert!(!repo.remove(&user, &ProductId("p-1".to_string())).await.expect("remove again"));
        assert!(repo.list(&user).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected() {
        let pool = setup().await;
        let repo = SqlCartRepository::new(pool);

        let error = repo.add(line("p-1", 0, 0)).await.expect_err("invalid");
        assert!(matches!(error, RepositoryError::Invalid(_)));
    }
}

use std::collections::BTreeMap;

use sqlx::Row;
use tracing::info;

use echoshop_core::domain::order::{Order, OrderId, OrderItem};
use echoshop_core::domain::product::ProductId;
use echoshop_core::domain::user::UserId;

use super::{decode, format_timestamp, parse_timestamp, sql_limit, OrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, order_id: &str) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT product_id, quantity FROM order_item WHERE order_id = ? ORDER BY line_no ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_item).collect()
    }
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<OrderItem, RepositoryError> {
    let product_id: String = decode(row.try_get("product_id"))?;
    let quantity: i64 = decode(row.try_get("quantity"))?;
    let quantity = u32::try_from(quantity)
        .map_err(|_| RepositoryError::Decode(format!("quantity out of range: {quantity}")))?;
    Ok(OrderItem { product_id: ProductId(product_id), quantity })
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn place(&self, order: Order) -> Result<(), RepositoryError> {
        order.validate().map_err(|e| RepositoryError::Invalid(e.to_string()))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO customer_order (id, user_id, created_at) VALUES (?, ?, ?)")
            .bind(&order.id.0)
            .bind(&order.user_id.0)
            .bind(format_timestamp(&order.created_at))
            .execute(&mut *tx)
            .await?;

        for (line_no, item) in order.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_item (order_id, line_no, product_id, quantity)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&order.id.0)
            .bind(sql_limit(line_no))
            .bind(&item.product_id.0)
            .bind(i64::from(item.quantity))
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM cart_item WHERE user_id = ? AND product_id = ?")
                .bind(&order.user_id.0)
                .bind(&item.product_id.0)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(
            event_name = "orders.placed",
            order_id = %order.id.0,
            user_id = %order.user_id.0,
            lines = order.items.len(),
            "order placed"
        );
        Ok(())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query("SELECT id, user_id, created_at FROM customer_order WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let user_id: String = decode(row.try_get("user_id"))?;
        let created_at: String = decode(row.try_get("created_at"))?;
        Ok(Some(Order {
            id: id.clone(),
            user_id: UserId(user_id),
            items: self.load_items(&id.0).await?,
            created_at: parse_timestamp(&created_at)?,
        }))
    }

    /// Newest orders first.
    async fn list_for_user(
        &self,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT o.id, o.created_at, oi.product_id, oi.quantity
             FROM (
                 SELECT id, created_at FROM customer_order
                 WHERE user_id = ?
                 ORDER BY created_at DESC, id ASC
                 LIMIT ?
             ) o
             JOIN order_item oi ON oi.order_id = o.id
             ORDER BY o.created_at DESC, o.id ASC, oi.line_no ASC",
        )
        .bind(&user.0)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut orders: Vec<Order> = Vec::new();
        let mut positions: BTreeMap<String, usize> = BTreeMap::new();
        for row in &rows {
            let id: String = decode(row.try_get("id"))?;
            let item = row_to_item(row)?;
            if let Some(position) = positions.get(&id) {
                orders[*position].items.push(item);
                continue;
            }
            let created_at: String = decode(row.try_get("created_at"))?;
            positions.insert(id.clone(), orders.len());
            orders.push(Order {
                id: OrderId(id),
                user_id: user.clone(),
                items: vec![item],
                created_at: parse_timestamp(&created_at)?,
            });
        }

        Ok(orders)
    }
}

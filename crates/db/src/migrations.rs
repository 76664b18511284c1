use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Tables the recommendation queries read from.
pub const REQUIRED_TABLES: &[&str] =
    &["category", "product", "customer_order", "order_item", "cart_item", "analytics_event"];

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Returns the entries of [`REQUIRED_TABLES`] absent from the connected database.
pub async fn missing_tables(pool: &DbPool) -> Result<Vec<&'static str>, sqlx::Error> {
    let mut missing = Vec::new();
    for table in REQUIRED_TABLES {
        let present: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        )
        .bind(*table)
        .fetch_one(pool)
        .await?;
        if present == 0 {
            missing.push(*table);
        }
    }
    Ok(missing)
}

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::Row;

use echoshop_core::analytics::{InteractionLog, InteractionLogError};
use echoshop_core::domain::interaction::{
    EventType, InteractionEvent, InteractionEventId, ResourceType,
};
use echoshop_core::domain::user::UserId;

use super::{decode, format_timestamp, parse_timestamp, sql_limit, RepositoryError};
use crate::DbPool;

/// Append-only store for shopper interactions, backed by `analytics_event`.
#[derive(Clone)]
pub struct SqlInteractionLog {
    pool: DbPool,
}

impl SqlInteractionLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, event: &InteractionEvent) -> Result<(), RepositoryError> {
        let metadata_json = serde_json::to_string(&event.metadata)
            .map_err(|e| RepositoryError::Invalid(e.to_string()))?;

        sqlx::query(
            "INSERT INTO analytics_event (id, user_id, event_type, resource_id, resource_type,
                                          metadata_json, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id.0)
        .bind(event.user_id.as_ref().map(|user| user.0.as_str()))
        .bind(event.event_type.as_str())
        .bind(&event.resource_id)
        .bind(event.resource_type.as_str())
        .bind(metadata_json)
        .bind(format_timestamp(&event.occurred_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// A user's events, newest first, optionally narrowed to one type.
    pub async fn list_for_user(
        &self,
        user: &UserId,
        event_type: Option<EventType>,
        limit: usize,
    ) -> Result<Vec<InteractionEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, user_id, event_type, resource_id, resource_type, metadata_json, occurred_at
             FROM analytics_event
             WHERE user_id = ?1 AND (?2 IS NULL OR event_type = ?2)
             ORDER BY occurred_at DESC, id ASC
             LIMIT ?3",
        )
        .bind(&user.0)
        .bind(event_type.map(EventType::as_str))
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<InteractionEvent, RepositoryError> {
    let id: String = decode(row.try_get("id"))?;
    let user_id: Option<String> = decode(row.try_get("user_id"))?;
    let event_type: String = decode(row.try_get("event_type"))?;
    let resource_id: String = decode(row.try_get("resource_id"))?;
    let resource_type: String = decode(row.try_get("resource_type"))?;
    let metadata_json: String = decode(row.try_get("metadata_json"))?;
    let occurred_at: String = decode(row.try_get("occurred_at"))?;

    let metadata: Map<String, Value> = serde_json::from_str(&metadata_json)
        .map_err(|e| RepositoryError::Decode(format!("invalid event metadata: {e}")))?;

    Ok(InteractionEvent {
        id: InteractionEventId(id),
        user_id: user_id.map(UserId),
        event_type: event_type
            .parse::<EventType>()
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        resource_id,
        resource_type: resource_type
            .parse::<ResourceType>()
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        metadata,
        occurred_at: parse_timestamp(&occurred_at)?,
    })
}

#[async_trait]
impl InteractionLog for SqlInteractionLog {
    async fn append(&self, event: &InteractionEvent) -> Result<(), InteractionLogError> {
        self.insert(event).await.map_err(|e| InteractionLogError(e.to_string()))
    }
}

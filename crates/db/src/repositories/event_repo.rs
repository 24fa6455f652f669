//! Repository for the `events` table.

use chrono::Utc;
use sqlx::types::Json;
use stampline_core::types::DbId;

use crate::models::event::Event;
use crate::DbPool;

/// Column list for `events` queries.
const COLUMNS: &str =
    "id, event_type, source_entity_type, source_entity_id, payload, created_at";

/// Provides append and read operations for the event log.
pub struct EventRepo;

impl EventRepo {
    /// Append an event, returning the generated ID.
    pub async fn insert(
        pool: &DbPool,
        event_type: &str,
        source_entity_type: Option<&str>,
        source_entity_id: Option<DbId>,
        payload: &serde_json::Value,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO events
                (event_type, source_entity_type, source_entity_id, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id",
        )
        .bind(event_type)
        .bind(source_entity_type)
        .bind(source_entity_id)
        .bind(Json(payload))
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    /// List recent events ordered newest-first.
    pub async fn list_recent(
        pool: &DbPool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Event>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM events ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
        );
        sqlx::query_as::<_, Event>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Events attached to one entity, oldest first.
    pub async fn list_for_entity(
        pool: &DbPool,
        source_entity_type: &str,
        source_entity_id: DbId,
    ) -> Result<Vec<Event>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM events
             WHERE source_entity_type = ?1 AND source_entity_id = ?2
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, Event>(&query)
            .bind(source_entity_type)
            .bind(source_entity_id)
            .fetch_all(pool)
            .await
    }
}

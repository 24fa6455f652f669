//! Repository for the `stamp_sets` table.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use stampline_core::generation::CharacterProposal;
use stampline_core::genre::Genre;
use stampline_core::status::{ModelStatus, SetStatus};
use stampline_core::types::DbId;

use crate::models::stamp_set::{ApprovedDirection, CreateStampSet, CreateVariation, StampSet};
use crate::DbPool;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, name, genre, character_description, base_prompt, reference_image_path, \
     direction_proposals, status, base_seed, character_consistency, exported, lora_model_path, \
     lora_status, parent_set_id, variation_theme, created_at, approved_at";

/// Default page size for listings.
const DEFAULT_LIST_LIMIT: i64 = 50;

/// Optional filters for [`StampSetRepo::list`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetFilter {
    pub status: Option<SetStatus>,
    pub genre: Option<Genre>,
    pub limit: Option<i64>,
}

/// A set plus its stamp counters, for listings.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StampSetSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub set: StampSet,
    pub stamp_count: i64,
    pub generated_count: i64,
}

/// Provides reads and single-statement updates for stamp sets.
pub struct StampSetRepo;

impl StampSetRepo {
    /// Insert a new set in `direction_pending`, returning the created row.
    ///
    /// The consistency flag follows the genre.
    pub async fn create(pool: &DbPool, input: &CreateStampSet) -> Result<StampSet, sqlx::Error> {
        let query = format!(
            "INSERT INTO stamp_sets (name, genre, status, character_consistency, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, StampSet>(&query)
            .bind(&input.name)
            .bind(input.genre.as_str())
            .bind(SetStatus::DirectionPending.as_str())
            .bind(input.genre.requires_consistency())
            .bind(Utc::now())
            .fetch_one(pool)
            .await
    }

    /// Insert a variation of `parent`, linked through `parent_set_id`.
    ///
    /// Genre, consistency, reference and description are inherited; the
    /// new set starts over in `direction_pending`.
    pub async fn create_variation(
        pool: &DbPool,
        input: &CreateVariation<'_>,
    ) -> Result<StampSet, sqlx::Error> {
        let query = format!(
            "INSERT INTO stamp_sets
                (name, genre, status, character_consistency, reference_image_path,
                 character_description, parent_set_id, variation_theme, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, StampSet>(&query)
            .bind(&input.name)
            .bind(input.parent.genre.as_str())
            .bind(SetStatus::DirectionPending.as_str())
            .bind(input.parent.character_consistency)
            .bind(&input.parent.reference_image_path)
            .bind(&input.parent.character_description)
            .bind(input.parent.id)
            .bind(&input.theme)
            .bind(Utc::now())
            .fetch_one(pool)
            .await
    }

    /// Find a set by ID.
    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<StampSet>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM stamp_sets WHERE id = ?1");
        sqlx::query_as::<_, StampSet>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List sets newest-first with their stamp counters.
    pub async fn list(
        pool: &DbPool,
        filter: &SetFilter,
    ) -> Result<Vec<StampSetSummary>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS},
                (SELECT COUNT(*) FROM stamps t WHERE t.set_id = stamp_sets.id) AS stamp_count,
                (SELECT COUNT(*) FROM stamps t
                  WHERE t.set_id = stamp_sets.id AND t.image_path IS NOT NULL) AS generated_count
             FROM stamp_sets
             WHERE (?1 IS NULL OR status = ?1)
               AND (?2 IS NULL OR genre = ?2)
             ORDER BY created_at DESC, id DESC
             LIMIT ?3"
        );
        sqlx::query_as::<_, StampSetSummary>(&query)
            .bind(filter.status.map(SetStatus::as_str))
            .bind(filter.genre.map(Genre::as_str))
            .bind(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500))
            .fetch_all(pool)
            .await
    }

    /// All sets currently in one of `statuses`, oldest first.
    pub async fn list_by_status(
        pool: &DbPool,
        statuses: &[SetStatus],
    ) -> Result<Vec<StampSet>, sqlx::Error> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=statuses.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            "SELECT {COLUMNS} FROM stamp_sets WHERE status IN ({placeholders}) ORDER BY id ASC"
        );
        let mut q = sqlx::query_as::<_, StampSet>(&query);
        for status in statuses {
            q = q.bind(status.as_str());
        }
        q.fetch_all(pool).await
    }

    /// All sets whose derived model is in `status`, oldest first.
    pub async fn list_by_model_status(
        pool: &DbPool,
        status: ModelStatus,
    ) -> Result<Vec<StampSet>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM stamp_sets WHERE lora_status = ?1 ORDER BY id ASC");
        sqlx::query_as::<_, StampSet>(&query)
            .bind(status.as_str())
            .fetch_all(pool)
            .await
    }

    /// Move a set from `from` to `to` in one statement.
    ///
    /// Returns `None` when the set is missing or no longer in `from`, so a
    /// concurrent writer can never be overwritten. Approval statuses stamp
    /// `approved_at`.
    pub async fn transition(
        pool: &DbPool,
        id: DbId,
        from: SetStatus,
        to: SetStatus,
    ) -> Result<Option<StampSet>, sqlx::Error> {
        let query = format!(
            "UPDATE stamp_sets SET
                status = ?3,
                approved_at = CASE WHEN ?4 THEN ?5 ELSE approved_at END
             WHERE id = ?1 AND status = ?2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, StampSet>(&query)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(to.records_approval())
            .bind(Utc::now())
            .fetch_optional(pool)
            .await
    }

    /// Set the genre and the consistency flag it implies.
    pub async fn select_genre(
        pool: &DbPool,
        id: DbId,
        genre: Genre,
    ) -> Result<Option<StampSet>, sqlx::Error> {
        let query = format!(
            "UPDATE stamp_sets SET genre = ?2, character_consistency = ?3
             WHERE id = ?1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, StampSet>(&query)
            .bind(id)
            .bind(genre.as_str())
            .bind(genre.requires_consistency())
            .fetch_optional(pool)
            .await
    }

    /// Record the uploaded reference image path.
    pub async fn set_reference(pool: &DbPool, id: DbId, path: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE stamp_sets SET reference_image_path = ?2 WHERE id = ?1")
            .bind(id)
            .bind(path)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the candidate directions awaiting a pick.
    pub async fn store_proposals(
        pool: &DbPool,
        id: DbId,
        proposals: &[CharacterProposal],
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE stamp_sets SET direction_proposals = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Json(proposals))
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Copy the chosen direction onto the set, clear the candidates and move
    /// to `direction_approved`.
    ///
    /// Only applies while the set is still `direction_pending`.
    pub async fn approve_direction(
        pool: &DbPool,
        id: DbId,
        direction: &ApprovedDirection,
    ) -> Result<Option<StampSet>, sqlx::Error> {
        let query = format!(
            "UPDATE stamp_sets SET
                character_description = ?3,
                base_prompt = ?4,
                character_consistency = ?5,
                direction_proposals = NULL,
                status = ?6,
                approved_at = ?7
             WHERE id = ?1 AND status = ?2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, StampSet>(&query)
            .bind(id)
            .bind(SetStatus::DirectionPending.as_str())
            .bind(&direction.description)
            .bind(&direction.base_prompt)
            .bind(direction.character_consistency)
            .bind(SetStatus::DirectionApproved.as_str())
            .bind(Utc::now())
            .fetch_optional(pool)
            .await
    }

    /// Assign the base seed unless one is already stored, returning the
    /// seed now in effect. `None` when the set does not exist.
    pub async fn set_base_seed_if_absent(
        pool: &DbPool,
        id: DbId,
        seed: i64,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query("UPDATE stamp_sets SET base_seed = ?2 WHERE id = ?1 AND base_seed IS NULL")
            .bind(id)
            .bind(seed)
            .execute(pool)
            .await?;
        let stored: Option<Option<i64>> =
            sqlx::query_scalar("SELECT base_seed FROM stamp_sets WHERE id = ?1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        Ok(stored.flatten())
    }

    /// Flag the set's training data as exported.
    pub async fn mark_exported(pool: &DbPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE stamp_sets SET exported = 1 WHERE id = ?1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update the derived-model status and path together.
    pub async fn update_model(
        pool: &DbPool,
        id: DbId,
        status: ModelStatus,
        model_path: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE stamp_sets SET lora_status = ?2, lora_model_path = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(model_path)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Permanently delete a set; its stamps go with it.
    pub async fn delete(pool: &DbPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM stamp_sets WHERE id = ?1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

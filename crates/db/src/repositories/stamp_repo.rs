//! Repository for the `stamps` table.

use chrono::Utc;
use stampline_core::status::StampStatus;
use stampline_core::types::DbId;

use crate::models::stamp::{CreateStamp, Stamp, StampCounts, SAMPLE_COUNT};
use crate::DbPool;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, set_id, number, phrase, prompt, negative_prompt, image_path, status, \
     seed, is_sample, retry_count, created_at";

/// Provides reads and per-stamp updates for stamps.
pub struct StampRepo;

impl StampRepo {
    /// Replace every stamp of a set with `phrases`, numbered `1..=N`.
    ///
    /// Runs in one transaction so ordinals stay contiguous even if the
    /// insert fails halfway. The first [`SAMPLE_COUNT`] stamps are flagged
    /// as samples.
    pub async fn replace_for_set(
        pool: &DbPool,
        set_id: DbId,
        stamps: &[CreateStamp],
    ) -> Result<Vec<Stamp>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM stamps WHERE set_id = ?1")
            .bind(set_id)
            .execute(&mut *tx)
            .await?;

        let query = format!(
            "INSERT INTO stamps
                (set_id, number, phrase, prompt, negative_prompt, status, is_sample, created_at)
             VALUES (?1, ?2, ?3, '', ?4, ?5, ?6, ?7)
             RETURNING {COLUMNS}"
        );
        let now = Utc::now();
        let mut created = Vec::with_capacity(stamps.len());
        for (i, input) in stamps.iter().enumerate() {
            let number = i as i64 + 1;
            let stamp = sqlx::query_as::<_, Stamp>(&query)
                .bind(set_id)
                .bind(number)
                .bind(&input.phrase)
                .bind(&input.negative_prompt)
                .bind(StampStatus::Pending.as_str())
                .bind(number <= SAMPLE_COUNT)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;
            created.push(stamp);
        }

        tx.commit().await?;
        Ok(created)
    }

    /// Delete every stamp of a set. Returns the number removed.
    pub async fn delete_for_set(pool: &DbPool, set_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM stamps WHERE set_id = ?1")
            .bind(set_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Find a stamp by ID.
    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Stamp>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM stamps WHERE id = ?1");
        sqlx::query_as::<_, Stamp>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All stamps of a set in ordinal order.
    pub async fn list_by_set(pool: &DbPool, set_id: DbId) -> Result<Vec<Stamp>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM stamps WHERE set_id = ?1 ORDER BY number ASC");
        sqlx::query_as::<_, Stamp>(&query)
            .bind(set_id)
            .fetch_all(pool)
            .await
    }

    /// The sample batch of a set in ordinal order.
    pub async fn list_samples(pool: &DbPool, set_id: DbId) -> Result<Vec<Stamp>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM stamps
             WHERE set_id = ?1 AND is_sample = 1
             ORDER BY number ASC
             LIMIT ?2"
        );
        sqlx::query_as::<_, Stamp>(&query)
            .bind(set_id)
            .bind(SAMPLE_COUNT)
            .fetch_all(pool)
            .await
    }

    /// Store the authored generation prompt.
    pub async fn set_prompt(pool: &DbPool, id: DbId, prompt: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE stamps SET prompt = ?2 WHERE id = ?1")
            .bind(id)
            .bind(prompt)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Store the seed used for the latest generation attempt.
    pub async fn set_seed(pool: &DbPool, id: DbId, seed: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE stamps SET seed = ?2 WHERE id = ?1")
            .bind(id)
            .bind(seed)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Store the produced artifact path.
    pub async fn set_image_path(pool: &DbPool, id: DbId, path: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE stamps SET image_path = ?2 WHERE id = ?1")
            .bind(id)
            .bind(path)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update a stamp's review status.
    pub async fn update_status(
        pool: &DbPool,
        id: DbId,
        status: StampStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE stamps SET status = ?2 WHERE id = ?1")
            .bind(id)
            .bind(status.as_str())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Bump the retry counter and mark the stamp `regenerating`.
    pub async fn begin_retry(pool: &DbPool, id: DbId) -> Result<Option<Stamp>, sqlx::Error> {
        let query = format!(
            "UPDATE stamps SET retry_count = retry_count + 1, status = ?2
             WHERE id = ?1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Stamp>(&query)
            .bind(id)
            .bind(StampStatus::Regenerating.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Stamp counters for one set.
    pub async fn counts(pool: &DbPool, set_id: DbId) -> Result<StampCounts, sqlx::Error> {
        sqlx::query_as::<_, StampCounts>(
            "SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN image_path IS NOT NULL THEN 1 ELSE 0 END), 0) AS generated,
                COALESCE(SUM(CASE WHEN status = 'approved' THEN 1 ELSE 0 END), 0) AS approved
             FROM stamps WHERE set_id = ?1",
        )
        .bind(set_id)
        .fetch_one(pool)
        .await
    }
}

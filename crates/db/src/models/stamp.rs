//! Stamp (one generated image within a set) model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use stampline_core::status::StampStatus;
use stampline_core::types::{DbId, Timestamp};

/// Number of leading stamps that make up the sample batch.
pub const SAMPLE_COUNT: i64 = 5;

/// A row from the `stamps` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Stamp {
    pub id: DbId,
    pub set_id: DbId,
    /// 1-based ordinal, unique within the set.
    pub number: i64,
    pub phrase: String,
    /// Authored generation prompt; empty until first generated.
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub image_path: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: StampStatus,
    pub seed: Option<i64>,
    pub is_sample: bool,
    pub retry_count: i64,
    pub created_at: Timestamp,
}

impl Stamp {
    /// Whether an artifact has already been produced.
    pub fn is_generated(&self) -> bool {
        self.image_path.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// DTO for one stamp in the bulk insert after phrase generation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateStamp {
    pub phrase: String,
    pub negative_prompt: Option<String>,
}

/// Per-set stamp counters for listings.
#[derive(Debug, Clone, Copy, Default, FromRow, Serialize, PartialEq, Eq)]
pub struct StampCounts {
    pub total: i64,
    pub generated: i64,
    pub approved: i64,
}

//! Stamp set model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use stampline_core::generation::CharacterProposal;
use stampline_core::genre::Genre;
use stampline_core::status::{ModelStatus, SetStatus};
use stampline_core::types::{DbId, Timestamp};

/// A row from the `stamp_sets` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StampSet {
    pub id: DbId,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub genre: Genre,
    /// Null until a direction is approved.
    pub character_description: Option<String>,
    pub base_prompt: Option<String>,
    pub reference_image_path: Option<String>,
    /// Candidates awaiting a pick; cleared on approval.
    pub direction_proposals: Option<Json<Vec<CharacterProposal>>>,
    #[sqlx(try_from = "String")]
    pub status: SetStatus,
    /// Assigned at most once.
    pub base_seed: Option<i64>,
    pub character_consistency: bool,
    pub exported: bool,
    pub lora_model_path: Option<String>,
    #[sqlx(try_from = "String")]
    pub lora_status: ModelStatus,
    pub parent_set_id: Option<DbId>,
    pub variation_theme: Option<String>,
    pub created_at: Timestamp,
    pub approved_at: Option<Timestamp>,
}

impl StampSet {
    /// The stored proposals, or an empty slice.
    pub fn proposals(&self) -> &[CharacterProposal] {
        self.direction_proposals
            .as_ref()
            .map(|p| p.0.as_slice())
            .unwrap_or_default()
    }
}

/// DTO for creating a new set.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateStampSet {
    pub name: String,
    pub genre: Genre,
}

/// DTO for creating a variation of an existing set.
#[derive(Debug, Clone)]
pub struct CreateVariation<'a> {
    pub parent: &'a StampSet,
    pub name: String,
    pub theme: String,
}

/// Direction chosen by the reviewer, copied onto the set.
#[derive(Debug, Clone)]
pub struct ApprovedDirection {
    pub description: String,
    pub base_prompt: String,
    pub character_consistency: bool,
}

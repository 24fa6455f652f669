//! Stamp-set genres and the consistency default each one implies.

use crate::error::CoreError;
use crate::status::define_text_enum;

define_text_enum! {
    /// What kind of subject a stamp set depicts.
    Genre {
        Animal => "animal",
        OriginalCharacter => "original_character",
        Concept => "concept",
        AiFree => "ai_free",
    }
}

impl Genre {
    /// Whether sets of this genre need one recurring character to look the
    /// same across every stamp.
    ///
    /// Concept sets have no recurring character, so each stamp is seeded
    /// independently.
    pub fn requires_consistency(self) -> bool {
        !matches!(self, Genre::Concept)
    }

    /// Human-readable label for chat buttons and listings.
    pub fn label(self) -> &'static str {
        match self {
            Genre::Animal => "Animal character",
            Genre::OriginalCharacter => "Original character",
            Genre::Concept => "Concept (no character)",
            Genre::AiFree => "Leave it to the AI",
        }
    }
}

//! Status enums persisted as TEXT columns, and the stamp-set state machine.
//!
//! Each enum stores its snake_case name in the database. Reads go through
//! `TryFrom<String>` so an unknown value surfaces as a decode error instead
//! of silently mapping to a default.

use crate::error::CoreError;

macro_rules! define_text_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$( $name::$variant ),+];

            /// The value stored in the database and used on the wire.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err(CoreError::Validation(format!(
                        "Invalid {} '{other}'. Must be one of: {}",
                        stringify!($name),
                        [$( $text ),+].join(", ")
                    ))),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = CoreError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

pub(crate) use define_text_enum;

define_text_enum! {
    /// Lifecycle status of a stamp set.
    SetStatus {
        DirectionPending => "direction_pending",
        DirectionApproved => "direction_approved",
        PatternsPending => "patterns_pending",
        PatternsApproved => "patterns_approved",
        SamplesGenerating => "samples_generating",
        SamplesReview => "samples_review",
        FullGenerating => "full_generating",
        FullReview => "full_review",
        Completed => "completed",
    }
}

define_text_enum! {
    /// Review status of a single stamp.
    StampStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Regenerating => "regenerating",
    }
}

define_text_enum! {
    /// Status of the derived (fine-tuned) model trained from a set.
    ModelStatus {
        Untrained => "none",
        Training => "training",
        Completed => "completed",
    }
}

impl SetStatus {
    /// Whether `self -> to` is an edge of the workflow graph.
    ///
    /// The two generating statuses have self-edges: re-invoking the stage
    /// that owns them resumes work instead of being rejected.
    pub fn can_transition(self, to: SetStatus) -> bool {
        use SetStatus::*;
        matches!(
            (self, to),
            (DirectionPending, DirectionApproved)
                | (DirectionApproved, PatternsPending)
                | (PatternsPending, PatternsApproved)
                | (PatternsApproved, PatternsPending)
                | (PatternsApproved, SamplesGenerating)
                | (SamplesGenerating, SamplesGenerating)
                | (SamplesGenerating, SamplesReview)
                | (SamplesReview, SamplesGenerating)
                | (SamplesReview, FullGenerating)
                | (FullGenerating, FullGenerating)
                | (FullGenerating, FullReview)
                | (FullReview, Completed)
        )
    }

    /// Reject `action` unless `self -> to` is a valid edge.
    pub fn ensure_transition(self, to: SetStatus, action: &str) -> Result<(), CoreError> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                action: action.to_string(),
                from: self.as_str().to_string(),
            })
        }
    }

    /// Reject `action` unless the current status is one of `allowed`.
    ///
    /// Used by operations that run inside a status without moving the set
    /// (proposal generation, phrase generation).
    pub fn ensure_one_of(self, allowed: &[SetStatus], action: &str) -> Result<(), CoreError> {
        if allowed.contains(&self) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                action: action.to_string(),
                from: self.as_str().to_string(),
            })
        }
    }

    /// A background stage owns the set while it is in this status.
    pub fn is_generating(self) -> bool {
        matches!(self, SetStatus::SamplesGenerating | SetStatus::FullGenerating)
    }

    /// Statuses that stamp the set's `approved_at` when entered.
    pub fn records_approval(self) -> bool {
        matches!(
            self,
            SetStatus::DirectionApproved | SetStatus::PatternsApproved | SetStatus::Completed
        )
    }

    /// Single-character marker used in chat listings.
    pub fn glyph(self) -> &'static str {
        match self {
            SetStatus::DirectionPending => "⏳",
            SetStatus::DirectionApproved => "✅",
            SetStatus::PatternsPending => "📝",
            SetStatus::PatternsApproved => "📋",
            SetStatus::SamplesGenerating => "🎨",
            SetStatus::SamplesReview => "👀",
            SetStatus::FullGenerating => "🚀",
            SetStatus::FullReview => "🔍",
            SetStatus::Completed => "🎉",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

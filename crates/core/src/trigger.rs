//! Trigger grammar for the chat surface.
//!
//! Slash-style commands (`new`, `list`, `help`) and button actions arrive
//! from the messaging collaborator as plain strings. Buttons carry an
//! `action_id` plus a value token `entityId[:parameter]`; each action maps
//! to exactly one workflow operation.

use crate::error::CoreError;
use crate::genre::Genre;
use crate::types::DbId;

pub const ACTION_CREATE_SET: &str = "create_new_stamp_set";
pub const ACTION_SHOW_HELP: &str = "show_help";
pub const ACTION_SHOW_LIST: &str = "show_stamp_list";
pub const ACTION_SELECT_GENRE: &str = "select_stamp_type";
pub const ACTION_HAS_REFERENCE: &str = "has_reference_image_yes";
pub const ACTION_NO_REFERENCE: &str = "has_reference_image_no";
pub const ACTION_APPROVE_DIRECTION: &str = "approve_direction";
pub const ACTION_REQUEST_PROPOSALS: &str = "request_new_proposals";
pub const ACTION_APPROVE_PHRASES: &str = "approve_phrases";
pub const ACTION_REGENERATE_PHRASES: &str = "regenerate_phrases";
pub const ACTION_APPROVE_SAMPLES: &str = "approve_samples";
pub const ACTION_REJECT_SAMPLES: &str = "reject_samples";
pub const ACTION_APPROVE_STAMP: &str = "approve_sample_stamp";
pub const ACTION_REGENERATE_STAMP: &str = "regenerate_stamp";
pub const ACTION_TRAIN_MODEL: &str = "train_model";
pub const ACTION_CREATE_VARIATION: &str = "create_variation";
pub const ACTION_RESUME_GENERATION: &str = "resume_generation";

/// A text command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a set, optionally named (`new Cat`).
    New { name: Option<String> },
    List,
    Help,
}

/// Parse command text. Anything unrecognised is answered with help.
pub fn parse_command(text: &str) -> Command {
    let text = text.trim();
    let (head, rest) = match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    };
    match head {
        "new" => Command::New {
            name: (!rest.is_empty()).then(|| rest.to_string()),
        },
        "list" => Command::List,
        _ => Command::Help,
    }
}

/// A decoded `entityId[:parameter]` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionToken {
    pub entity_id: DbId,
    pub parameter: Option<String>,
}

impl ActionToken {
    /// The parameter, or a validation error naming what was expected.
    pub fn require_parameter(&self, what: &str) -> Result<&str, CoreError> {
        self.parameter
            .as_deref()
            .ok_or_else(|| CoreError::Validation(format!("Action value is missing the {what}")))
    }
}

/// Encode a button value.
pub fn encode_token(entity_id: DbId, parameter: Option<&str>) -> String {
    match parameter {
        Some(p) => format!("{entity_id}:{p}"),
        None => entity_id.to_string(),
    }
}

/// Decode a button value.
pub fn parse_token(value: &str) -> Result<ActionToken, CoreError> {
    let (id, parameter) = match value.split_once(':') {
        Some((id, p)) => (id, Some(p.trim()).filter(|p| !p.is_empty())),
        None => (value, None),
    };
    let entity_id = id
        .trim()
        .parse::<DbId>()
        .map_err(|_| CoreError::Validation(format!("Invalid entity id in action value '{value}'")))?;
    Ok(ActionToken {
        entity_id,
        parameter: parameter.map(str::to_string),
    })
}

/// A workflow operation requested by a button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    CreateSet,
    ShowHelp,
    ShowList,
    SelectGenre { set_id: DbId, genre: Genre },
    AwaitReference { set_id: DbId },
    StartDirection { set_id: DbId },
    ApproveDirection { set_id: DbId, proposal_index: usize },
    RequestProposals { set_id: DbId, hint: Option<String> },
    GenerateSamples { set_id: DbId },
    RegeneratePhrases { set_id: DbId, hint: Option<String> },
    ApproveSamples { set_id: DbId },
    RejectSamples { set_id: DbId },
    ApproveStamp { set_id: DbId, stamp_id: DbId },
    RegenerateStamp { set_id: DbId, stamp_id: DbId, modification: Option<String> },
    TrainModel { set_id: DbId },
    CreateVariation { set_id: DbId, theme: String },
    /// Re-enter whichever generating stage the set is stuck in.
    ResumeGeneration { set_id: DbId },
}

/// Map a button click to its operation.
pub fn parse_action(action_id: &str, value: &str) -> Result<Trigger, CoreError> {
    match action_id {
        ACTION_CREATE_SET => return Ok(Trigger::CreateSet),
        ACTION_SHOW_HELP => return Ok(Trigger::ShowHelp),
        ACTION_SHOW_LIST => return Ok(Trigger::ShowList),
        _ => {}
    }

    let token = parse_token(value)?;
    let set_id = token.entity_id;

    // Older messages carry the proposal index in the action id itself.
    if let Some(index) = action_id.strip_prefix("approve_direction_") {
        let proposal_index = parse_index(index)?;
        return Ok(Trigger::ApproveDirection {
            set_id,
            proposal_index,
        });
    }

    let trigger = match action_id {
        ACTION_SELECT_GENRE => Trigger::SelectGenre {
            set_id,
            genre: token.require_parameter("genre")?.parse()?,
        },
        ACTION_HAS_REFERENCE => Trigger::AwaitReference { set_id },
        ACTION_NO_REFERENCE => Trigger::StartDirection { set_id },
        ACTION_APPROVE_DIRECTION => Trigger::ApproveDirection {
            set_id,
            proposal_index: parse_index(token.require_parameter("proposal index")?)?,
        },
        ACTION_REQUEST_PROPOSALS => Trigger::RequestProposals {
            set_id,
            hint: token.parameter,
        },
        ACTION_APPROVE_PHRASES => Trigger::GenerateSamples { set_id },
        ACTION_REGENERATE_PHRASES => Trigger::RegeneratePhrases {
            set_id,
            hint: token.parameter,
        },
        ACTION_APPROVE_SAMPLES => Trigger::ApproveSamples { set_id },
        ACTION_REJECT_SAMPLES => Trigger::RejectSamples { set_id },
        ACTION_APPROVE_STAMP => Trigger::ApproveStamp {
            set_id,
            stamp_id: parse_stamp_id(token.require_parameter("stamp id")?)?,
        },
        ACTION_REGENERATE_STAMP => {
            let param = token.require_parameter("stamp id")?;
            // `stampId` or `stampId:modification`
            let (stamp, modification) = match param.split_once(':') {
                Some((s, m)) => (s, Some(m.trim().to_string()).filter(|m| !m.is_empty())),
                None => (param, None),
            };
            Trigger::RegenerateStamp {
                set_id,
                stamp_id: parse_stamp_id(stamp)?,
                modification,
            }
        }
        ACTION_TRAIN_MODEL => Trigger::TrainModel { set_id },
        ACTION_RESUME_GENERATION => Trigger::ResumeGeneration { set_id },
        ACTION_CREATE_VARIATION => Trigger::CreateVariation {
            set_id,
            theme: token.require_parameter("variation theme")?.to_string(),
        },
        other => {
            return Err(CoreError::Validation(format!("Unknown action '{other}'")));
        }
    };
    Ok(trigger)
}

fn parse_index(raw: &str) -> Result<usize, CoreError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(CoreError::Validation(format!(
            "Proposal index must be a positive integer, got '{raw}'"
        ))),
    }
}

fn parse_stamp_id(raw: &str) -> Result<DbId, CoreError> {
    raw.trim()
        .parse::<DbId>()
        .map_err(|_| CoreError::Validation(format!("Invalid stamp id '{raw}'")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

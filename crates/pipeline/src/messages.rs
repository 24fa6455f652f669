//! Interactive chat messages.
//!
//! Every message is a [`Notification`] with a plain-text fallback plus a
//! Block Kit payload. Button values are `entityId[:parameter]` tokens that
//! [`stampline_core::trigger::parse_action`] maps back to an operation.

use serde_json::{json, Value};
use stampline_core::generation::CharacterProposal;
use stampline_core::genre::Genre;
use stampline_core::notify::Notification;
use stampline_core::trigger::{self, encode_token};
use stampline_core::types::DbId;
use stampline_db::models::stamp::Stamp;
use stampline_db::models::stamp_set::StampSet;
use stampline_db::repositories::stamp_set_repo::StampSetSummary;

use crate::export::ExportSummary;

/// Phrases shown inline before the list is truncated.
const MAX_LISTED_PHRASES: usize = 40;

// ---------------------------------------------------------------------------
// Block helpers
// ---------------------------------------------------------------------------

fn section(text: &str) -> Value {
    json!({ "type": "section", "text": { "type": "mrkdwn", "text": text } })
}

fn context(text: &str) -> Value {
    json!({ "type": "context", "elements": [{ "type": "mrkdwn", "text": text }] })
}

fn divider() -> Value {
    json!({ "type": "divider" })
}

fn button(label: &str, action_id: &str, value: String) -> Value {
    json!({
        "type": "button",
        "text": { "type": "plain_text", "text": label },
        "action_id": action_id,
        "value": value,
    })
}

fn primary(mut b: Value) -> Value {
    b["style"] = json!("primary");
    b
}

fn danger(mut b: Value) -> Value {
    b["style"] = json!("danger");
    b
}

fn actions(elements: Vec<Value>) -> Value {
    json!({ "type": "actions", "elements": elements })
}

fn message(text: String, blocks: Vec<Value>) -> Notification {
    Notification::text(text).with_blocks(Value::Array(blocks))
}

fn file_url(prefix: &str, set_id: DbId, file_name: &str) -> String {
    format!("{}/{set_id}/{file_name}", prefix.trim_end_matches('/'))
}

// ---------------------------------------------------------------------------
// Direction stage
// ---------------------------------------------------------------------------

/// First message for a new set: pick a genre, then say whether a reference
/// image will be uploaded.
pub fn set_created(set: &StampSet) -> Notification {
    let genre_buttons = Genre::ALL
        .iter()
        .map(|g| {
            button(
                g.label(),
                trigger::ACTION_SELECT_GENRE,
                encode_token(set.id, Some(g.as_str())),
            )
        })
        .collect();
    message(
        format!("Created stamp set \"{}\" (#{}).", set.name, set.id),
        vec![
            section(&format!(
                "*New stamp set:* {} (#{})\nGenre: *{}*. Pick another genre if needed.",
                set.name,
                set.id,
                set.genre.label()
            )),
            actions(genre_buttons),
            reference_question_block(set.id),
        ],
    )
}

fn reference_question_block(set_id: DbId) -> Value {
    actions(vec![
        button(
            "I have a reference image",
            trigger::ACTION_HAS_REFERENCE,
            encode_token(set_id, None),
        ),
        primary(button(
            "No reference, propose characters",
            trigger::ACTION_NO_REFERENCE,
            encode_token(set_id, None),
        )),
    ])
}

pub fn genre_selected(set: &StampSet) -> Notification {
    let consistency = if set.character_consistency {
        "one recurring character"
    } else {
        "independent images"
    };
    message(
        format!("Genre for #{} set to {}.", set.id, set.genre.label()),
        vec![
            section(&format!(
                "Genre set to *{}* ({consistency}).",
                set.genre.label()
            )),
            reference_question_block(set.id),
        ],
    )
}

pub fn awaiting_reference(set_id: DbId) -> Notification {
    message(
        format!("Upload a reference image for set #{set_id}."),
        vec![section(&format!(
            "Upload the reference image for set #{set_id} (`POST /api/v1/sets/{set_id}/reference`). \
             Character proposals start once it arrives."
        ))],
    )
}

pub fn proposals_started(set_id: DbId) -> Notification {
    Notification::text(format!("Generating character proposals for set #{set_id}..."))
}

pub fn proposals(set: &StampSet, proposals: &[CharacterProposal]) -> Notification {
    let mut blocks = vec![section(&format!("*Character proposals for {}*", set.name))];
    for (i, p) in proposals.iter().enumerate() {
        let index = (i + 1).to_string();
        blocks.push(divider());
        blocks.push(json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("*{}. {}*\n{}", index, p.name, p.description),
            },
            "accessory": primary(button(
                "Choose",
                trigger::ACTION_APPROVE_DIRECTION,
                encode_token(set.id, Some(&index)),
            )),
        }));
    }
    blocks.push(actions(vec![button(
        "Propose again",
        trigger::ACTION_REQUEST_PROPOSALS,
        encode_token(set.id, None),
    )]));
    message(
        format!("{} character proposals for set #{}.", proposals.len(), set.id),
        blocks,
    )
}

// ---------------------------------------------------------------------------
// Phrase stage
// ---------------------------------------------------------------------------

pub fn direction_approved(set_id: DbId) -> Notification {
    Notification::text(format!(
        "Direction approved for set #{set_id}. Generating phrases..."
    ))
}

pub fn phrases(set: &StampSet, stamps: &[Stamp]) -> Notification {
    let listed: Vec<String> = stamps
        .iter()
        .take(MAX_LISTED_PHRASES)
        .map(|s| format!("{:02}. {}", s.number, s.phrase))
        .collect();
    let mut body = listed.join("\n");
    if stamps.len() > MAX_LISTED_PHRASES {
        body.push_str(&format!("\n... and {} more", stamps.len() - MAX_LISTED_PHRASES));
    }
    message(
        format!("{} phrases ready for set #{}.", stamps.len(), set.id),
        vec![
            section(&format!("*Phrases for {}* ({})", set.name, stamps.len())),
            section(&format!("```{body}```")),
            actions(vec![
                primary(button(
                    "Approve, generate samples",
                    trigger::ACTION_APPROVE_PHRASES,
                    encode_token(set.id, None),
                )),
                button(
                    "Regenerate phrases",
                    trigger::ACTION_REGENERATE_PHRASES,
                    encode_token(set.id, None),
                ),
            ]),
        ],
    )
}

// ---------------------------------------------------------------------------
// Generation stages
// ---------------------------------------------------------------------------

pub fn samples_started(set_id: DbId, count: usize) -> Notification {
    Notification::text(format!("Generating {count} sample stamps for set #{set_id}..."))
}

pub fn samples_ready(
    set: &StampSet,
    samples: &[Stamp],
    failed: usize,
    files_prefix: &str,
) -> Notification {
    let grid = file_url(files_prefix, set.id, stampline_core::naming::SAMPLE_GRID_FILE);
    let mut blocks = vec![section(&format!(
        "*Samples ready for {}*\n<{grid}|Open the sample grid>",
        set.name
    ))];
    if failed > 0 {
        blocks.push(context(&format!("{failed} sample(s) failed to generate.")));
    }
    for stamp in samples {
        let stamp_param = stamp.id.to_string();
        blocks.push(json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("*{:02}* {}", stamp.number, stamp.phrase),
            },
        }));
        blocks.push(actions(vec![
            button(
                "OK",
                trigger::ACTION_APPROVE_STAMP,
                encode_token(set.id, Some(&stamp_param)),
            ),
            button(
                "Redo",
                trigger::ACTION_REGENERATE_STAMP,
                encode_token(set.id, Some(&stamp_param)),
            ),
        ]));
    }
    blocks.push(actions(vec![
        primary(button(
            "Approve, generate all",
            trigger::ACTION_APPROVE_SAMPLES,
            encode_token(set.id, None),
        )),
        danger(button(
            "Reject, redo samples",
            trigger::ACTION_REJECT_SAMPLES,
            encode_token(set.id, None),
        )),
    ]));
    message(format!("Samples ready for set #{}.", set.id), blocks)
}

pub fn full_started(set_id: DbId, remaining: usize, total: usize) -> Notification {
    Notification::text(format!(
        "Generating stamps for set #{set_id}: {remaining} of {total} remaining..."
    ))
}

pub fn progress(set_id: DbId, done: usize, total: usize) -> Notification {
    Notification::text(format!("Set #{set_id}: {done}/{total} stamps generated."))
}

pub fn full_incomplete(set_id: DbId, failed: usize, total: usize) -> Notification {
    message(
        format!("Set #{set_id}: {failed} of {total} stamps failed."),
        vec![
            section(&format!(
                "*{failed} of {total} stamps failed* for set #{set_id}. \
                 Finished stamps are kept; resuming only generates the missing ones."
            )),
            actions(vec![primary(button(
                "Resume generation",
                trigger::ACTION_RESUME_GENERATION,
                encode_token(set_id, None),
            ))]),
        ],
    )
}

pub fn completed(set: &StampSet, export: &ExportSummary, files_prefix: &str) -> Notification {
    let grid = file_url(files_prefix, set.id, stampline_core::naming::FULL_GRID_FILE);
    message(
        format!("Stamp set \"{}\" completed.", set.name),
        vec![
            section(&format!(
                "*{} is complete!*\n<{grid}|Open the full grid>\n{} stamps exported for training.",
                set.name, export.exported
            )),
            actions(vec![button(
                "Train a character model",
                trigger::ACTION_TRAIN_MODEL,
                encode_token(set.id, None),
            )]),
        ],
    )
}

pub fn stamp_regenerated(set_id: DbId, stamp: &Stamp, files_prefix: &str) -> Notification {
    let file = stampline_core::naming::stamp_file_name(stamp.number);
    let url = file_url(files_prefix, set_id, &file);
    let stamp_param = stamp.id.to_string();
    message(
        format!("Stamp {:02} of set #{set_id} regenerated.", stamp.number),
        vec![
            section(&format!(
                "*Stamp {:02} regenerated* ({})\n<{url}|Open image>",
                stamp.number, stamp.phrase
            )),
            actions(vec![
                button(
                    "OK",
                    trigger::ACTION_APPROVE_STAMP,
                    encode_token(set_id, Some(&stamp_param)),
                ),
                button(
                    "Redo again",
                    trigger::ACTION_REGENERATE_STAMP,
                    encode_token(set_id, Some(&stamp_param)),
                ),
            ]),
        ],
    )
}

// ---------------------------------------------------------------------------
// Training
// ---------------------------------------------------------------------------

pub fn training_started(set_id: DbId) -> Notification {
    Notification::text(format!("Training a character model for set #{set_id}. This can take a while."))
}

pub fn training_finished(set_id: DbId, model_path: &str) -> Notification {
    Notification::text(format!(
        "Character model for set #{set_id} is ready ({model_path}). New stamps will use it."
    ))
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

/// Failure report for a background stage, with a retry button when the
/// stage can be re-entered from a button.
pub fn stage_failed(set_id: DbId, stage: &str, error: &str, retry: Option<&str>) -> Notification {
    let mut blocks = vec![section(&format!(
        ":warning: *{stage}* failed for set #{set_id}\n{error}"
    ))];
    if let Some(action_id) = retry {
        blocks.push(actions(vec![button(
            "Retry",
            action_id,
            encode_token(set_id, None),
        )]));
    }
    message(format!("{stage} failed for set #{set_id}: {error}"), blocks)
}

// ---------------------------------------------------------------------------
// Listing and help
// ---------------------------------------------------------------------------

pub fn set_list(sets: &[StampSetSummary]) -> Notification {
    if sets.is_empty() {
        return Notification::text("No stamp sets yet. Use `new` to create one.");
    }
    let lines: Vec<String> = sets
        .iter()
        .map(|s| {
            format!(
                "{} #{} {} ({}) {}/{} stamps, {}",
                s.set.status.glyph(),
                s.set.id,
                s.set.name,
                s.set.genre.label(),
                s.generated_count,
                s.stamp_count,
                s.set.status
            )
        })
        .collect();
    let body = lines.join("\n");
    message(
        format!("{} recent stamp sets.", sets.len()),
        vec![section("*Recent stamp sets*"), section(&body)],
    )
}

pub fn help() -> Notification {
    let body = "*Commands*\n\
        `new [name]`: start a new stamp set\n\
        `list`: show the 10 most recent sets\n\
        `help`: show this message\n\n\
        *Flow*\n\
        genre → character direction → phrases → 5 samples → full set → training data export";
    message(
        "Commands: new [name], list, help".to_string(),
        vec![
            section(body),
            actions(vec![
                primary(button("New stamp set", trigger::ACTION_CREATE_SET, String::new())),
                button("List sets", trigger::ACTION_SHOW_LIST, String::new()),
            ]),
        ],
    )
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use stampline_core::status::{ModelStatus, SetStatus, StampStatus};
    use stampline_core::trigger::{parse_action, Trigger};

    use super::*;

    fn set() -> StampSet {
        StampSet {
            id: 4,
            name: "Cat".into(),
            genre: Genre::Animal,
            character_description: None,
            base_prompt: None,
            reference_image_path: None,
            direction_proposals: None,
            status: SetStatus::DirectionPending,
            base_seed: None,
            character_consistency: true,
            exported: false,
            lora_model_path: None,
            lora_status: ModelStatus::Untrained,
            parent_set_id: None,
            variation_theme: None,
            created_at: Utc::now(),
            approved_at: None,
        }
    }

    fn stamp(id: DbId, number: i64) -> Stamp {
        Stamp {
            id,
            set_id: 4,
            number,
            phrase: format!("phrase {number}"),
            prompt: String::new(),
            negative_prompt: None,
            image_path: None,
            status: StampStatus::Pending,
            seed: None,
            is_sample: true,
            retry_count: 0,
            created_at: Utc::now(),
        }
    }

    /// Every button in `n` parses back into a trigger.
    fn buttons(n: &Notification) -> Vec<Trigger> {
        let mut out = Vec::new();
        let blocks = n.blocks.as_ref().unwrap().as_array().unwrap();
        for block in blocks {
            let mut elements: Vec<&Value> = Vec::new();
            if let Some(list) = block.get("elements").and_then(Value::as_array) {
                elements.extend(list.iter().filter(|e| e["type"] == "button"));
            }
            if let Some(acc) = block.get("accessory") {
                elements.push(acc);
            }
            for el in elements {
                let action = el["action_id"].as_str().unwrap();
                let value = el["value"].as_str().unwrap();
                out.push(parse_action(action, value).unwrap());
            }
        }
        out
    }

    #[test]
    fn set_created_offers_every_genre_and_reference_choice() {
        let triggers = buttons(&set_created(&set()));
        for genre in Genre::ALL {
            assert!(triggers.contains(&Trigger::SelectGenre {
                set_id: 4,
                genre: *genre
            }));
        }
        assert!(triggers.contains(&Trigger::StartDirection { set_id: 4 }));
        assert!(triggers.contains(&Trigger::AwaitReference { set_id: 4 }));
    }

    #[test]
    fn proposal_buttons_carry_one_based_index() {
        let p = CharacterProposal {
            name: "Mochi".into(),
            genre: "animal".into(),
            description: "round".into(),
            base_prompt: "round cat".into(),
            consistency_hint: true,
        };
        let triggers = buttons(&proposals(&set(), &[p.clone(), p]));
        assert!(triggers.contains(&Trigger::ApproveDirection {
            set_id: 4,
            proposal_index: 2
        }));
        assert!(triggers.contains(&Trigger::RequestProposals {
            set_id: 4,
            hint: None
        }));
    }

    #[test]
    fn sample_review_buttons_round_trip() {
        let samples = vec![stamp(11, 1), stamp(12, 2)];
        let n = samples_ready(&set(), &samples, 1, "/api/v1/files");
        let triggers = buttons(&n);
        assert!(triggers.contains(&Trigger::ApproveSamples { set_id: 4 }));
        assert!(triggers.contains(&Trigger::RejectSamples { set_id: 4 }));
        assert!(triggers.contains(&Trigger::RegenerateStamp {
            set_id: 4,
            stamp_id: 12,
            modification: None
        }));
        assert!(triggers.contains(&Trigger::ApproveStamp {
            set_id: 4,
            stamp_id: 11
        }));
        let text = n.blocks.unwrap().to_string();
        assert!(text.contains("/api/v1/files/4/sample_grid.png"));
        assert!(text.contains("1 sample(s) failed"));
    }

    #[test]
    fn long_phrase_lists_are_truncated() {
        let stamps: Vec<Stamp> = (1..=45).map(|n| stamp(n, n)).collect();
        let n = phrases(&set(), &stamps);
        assert!(n.blocks.unwrap().to_string().contains("and 5 more"));
    }

    #[test]
    fn empty_listing_points_to_new() {
        assert!(set_list(&[]).text.contains("`new`"));
    }

    #[test]
    fn failure_offers_retry_when_possible() {
        let n = stage_failed(4, "Full generation", "timeout", Some(trigger::ACTION_RESUME_GENERATION));
        assert_eq!(buttons(&n), vec![Trigger::ResumeGeneration { set_id: 4 }]);
        let n = stage_failed(4, "Training", "exit 1", None);
        assert!(buttons(&n).is_empty());
    }
}

//! Trigger surface: text commands and button actions.
//!
//! Each trigger runs one engine operation and produces a short
//! acknowledgement. The acknowledgement is posted to the chat channel and
//! returned to the caller; results of background stages arrive later
//! through the same channel.

use stampline_core::genre::Genre;
use stampline_core::notify::Notification;
use stampline_core::trigger::{parse_action, parse_command, Command, Trigger};
use stampline_db::repositories::{SetFilter, StampSetRepo};

use crate::engine::{DirectionStart, WorkflowEngine};
use crate::error::WorkflowError;
use crate::messages;

/// Sets shown by the `list` command.
const LIST_LIMIT: i64 = 10;

/// Genre of sets created from the `new` command until one is picked.
const DEFAULT_GENRE: Genre = Genre::Animal;

impl WorkflowEngine {
    /// Handle a `new`, `list` or `help` command.
    pub async fn handle_command(&self, text: &str) -> Result<Notification, WorkflowError> {
        let trigger = match parse_command(text) {
            Command::New { name } => {
                let name = name.unwrap_or_else(Self::default_set_name);
                let set = self.create_set(&name, DEFAULT_GENRE).await?;
                return Ok(self.acknowledge(messages::set_created(&set)));
            }
            Command::List => Trigger::ShowList,
            Command::Help => Trigger::ShowHelp,
        };
        self.handle_trigger(trigger).await
    }

    /// Handle a button click.
    pub async fn handle_action(
        &self,
        action_id: &str,
        value: &str,
    ) -> Result<Notification, WorkflowError> {
        let trigger = parse_action(action_id, value)?;
        tracing::debug!(action_id, value, ?trigger, "Action received");
        self.handle_trigger(trigger).await
    }

    /// Run a decoded trigger.
    pub async fn handle_trigger(&self, trigger: Trigger) -> Result<Notification, WorkflowError> {
        let ack = match trigger {
            Trigger::CreateSet => {
                let set = self
                    .create_set(&Self::default_set_name(), DEFAULT_GENRE)
                    .await?;
                messages::set_created(&set)
            }
            Trigger::ShowHelp => return Ok(messages::help()),
            Trigger::ShowList => {
                let filter = SetFilter {
                    limit: Some(LIST_LIMIT),
                    ..SetFilter::default()
                };
                let sets = StampSetRepo::list(self.pool(), &filter).await?;
                return Ok(messages::set_list(&sets));
            }
            Trigger::SelectGenre { set_id, genre } => {
                let set = self.select_genre(set_id, genre).await?;
                messages::genre_selected(&set)
            }
            Trigger::AwaitReference { set_id } => match self.start_direction(set_id, true).await? {
                DirectionStart::AwaitingReference => messages::awaiting_reference(set_id),
                DirectionStart::Started(_) => messages::proposals_started(set_id),
            },
            Trigger::StartDirection { set_id } => {
                self.start_direction(set_id, false).await?;
                messages::proposals_started(set_id)
            }
            Trigger::RequestProposals { set_id, hint } => {
                self.request_proposals(set_id, hint).await?;
                messages::proposals_started(set_id)
            }
            Trigger::ApproveDirection {
                set_id,
                proposal_index,
            } => {
                self.approve_direction(set_id, proposal_index).await?;
                messages::direction_approved(set_id)
            }
            Trigger::GenerateSamples { set_id } => {
                self.generate_samples(set_id).await?;
                Notification::text(format!("Phrases approved for set #{set_id}."))
            }
            Trigger::RegeneratePhrases { set_id, hint } => {
                self.regenerate_phrases(set_id, hint).await?;
                Notification::text(format!("Regenerating phrases for set #{set_id}..."))
            }
            Trigger::ApproveSamples { set_id } => {
                self.approve_samples(set_id).await?;
                Notification::text(format!("Samples approved for set #{set_id}."))
            }
            Trigger::RejectSamples { set_id } => {
                self.reject_samples(set_id).await?;
                Notification::text(format!("Samples rejected for set #{set_id}. Redoing them."))
            }
            Trigger::ApproveStamp { set_id, stamp_id } => {
                let stamp = self.approve_stamp(set_id, stamp_id).await?;
                Notification::text(format!(
                    "Stamp {:02} of set #{set_id} approved.",
                    stamp.number
                ))
            }
            Trigger::RegenerateStamp {
                set_id,
                stamp_id,
                modification,
            } => {
                self.regenerate_stamp(set_id, stamp_id, modification).await?;
                Notification::text(format!("Regenerating stamp {stamp_id} of set #{set_id}..."))
            }
            Trigger::TrainModel { set_id } => {
                self.train_model(set_id).await?;
                Notification::text(format!("Model training queued for set #{set_id}."))
            }
            Trigger::CreateVariation { set_id, theme } => {
                let (set, _) = self.create_variation(set_id, &theme).await?;
                Notification::text(format!(
                    "Created variation \"{}\" (#{}). Proposing characters...",
                    set.name, set.id
                ))
            }
            Trigger::ResumeGeneration { set_id } => {
                self.resume(set_id).await?;
                Notification::text(format!("Resuming set #{set_id}..."))
            }
        };
        Ok(self.acknowledge(ack))
    }

    /// Post `ack` to the chat channel and hand it back.
    fn acknowledge(&self, ack: Notification) -> Notification {
        self.notify(ack.clone());
        ack
    }
}

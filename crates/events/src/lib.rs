//! Event bus and notification delivery.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`; the workflow engine's observability sink.
//! - [`PlatformEvent`]: the event envelope.
//! - [`EventPersistence`]: background task writing every event to the
//!   `events` table.
//! - [`delivery`]: notification sinks (Slack, log-only).

pub mod bus;
pub mod delivery;
pub mod persistence;

pub use bus::{EventBus, PlatformEvent};
pub use delivery::log::LogNotifier;
pub use delivery::slack::{SlackConfig, SlackNotifier};
pub use persistence::EventPersistence;

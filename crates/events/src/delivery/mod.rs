//! Notification sinks for workflow messages.

pub mod log;
pub mod slack;

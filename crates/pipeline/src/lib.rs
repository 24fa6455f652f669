//! Stamp-set workflow engine.
//!
//! [`WorkflowEngine`] validates each operation against the set's status,
//! serialises background stages per set through the [`TaskRegistry`] and
//! reports results through the injected notification sink. Stage bodies
//! live on the engine; supporting pieces are split out:
//!
//! - [`composite`]: preview grids.
//! - [`export`]: training-data export.
//! - [`messages`]: interactive chat messages.
//! - [`dispatch`]: commands and button actions.

pub mod composite;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod export;
pub mod messages;
pub mod notifier;
pub mod registry;

pub use config::EngineConfig;
pub use engine::{DirectionStart, EngineContext, Stage, WorkflowEngine};
pub use error::WorkflowError;
pub use registry::{TaskHandle, TaskRegistry};

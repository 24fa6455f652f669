//! Domain types and rules for the stamp-set production workflow.
//!
//! Everything here is free of database and HTTP concerns so the state
//! machine, seed policy and trigger grammar can be tested in isolation.
//! The collaborator traits ([`generation::PromptClient`],
//! [`generation::ImageClient`], [`notify::NotificationSink`]) are defined
//! here so the pipeline and its adapters agree on one contract.

pub mod error;
pub mod generation;
pub mod genre;
pub mod naming;
pub mod notify;
pub mod seed;
pub mod status;
pub mod training;
pub mod trigger;
pub mod types;

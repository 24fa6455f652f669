//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&DbPool` as the first argument.

pub mod event_repo;
pub mod stamp_repo;
pub mod stamp_set_repo;

pub use event_repo::EventRepo;
pub use stamp_repo::StampRepo;
pub use stamp_set_repo::{SetFilter, StampSetRepo};

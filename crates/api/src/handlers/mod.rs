pub mod files;
pub mod sets;
pub mod triggers;

//! Row structs and input DTOs.
//!
//! Each submodule holds a `FromRow` + `Serialize` entity matching its table
//! plus the `Deserialize` DTOs used to create rows.

pub mod event;
pub mod stamp;
pub mod stamp_set;

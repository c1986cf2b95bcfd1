//! Entity structs and DTOs.
//!
//! Each submodule pairs a `FromRow` + `Serialize` entity matching the
//! database row with the create DTO used for inserts.

pub mod audit;
pub mod job;

//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod audit_log_repo;
pub mod job_queue_repo;
pub mod reference_repo;
pub mod report_table_repo;

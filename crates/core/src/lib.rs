//! Pure domain logic for the bulk-import / reconciliation pipeline.
//!
//! This crate has zero external effects (no DB, no async, no I/O). It
//! provides:
//!
//! - Cell cleaning and canonical row types
//! - Per-report-type column mapping and required-field validation
//! - Composite unique key construction and in-run duplicate detection
//! - The declarative report-type registry
//! - Run summary accounting

pub mod error;
pub mod keys;
pub mod mapping;
pub mod registry;
pub mod rows;
pub mod summary;
pub mod types;

//! Downstream recomputation worker.
//!
//! Claims jobs from the `downstream_jobs` queue and executes the SQL
//! recomputations that keep the derived tables in sync with the imported
//! report tables. Safe to run as multiple replicas: claiming uses
//! `FOR UPDATE SKIP LOCKED` and every recomputation is an idempotent
//! upsert over its natural key.

pub mod jobs;
pub mod runner;

//! Streaming bulk-import / reconciliation pipeline.
//!
//! Composes the pull-based row source, batch accumulator, bounded-concurrency
//! transformer, load strategies, consistency verifier, audit logging, and
//! downstream job dispatch into one request-scoped run. All external effects
//! go through the [`store::ReportStore`], [`cache::ReferenceLookup`],
//! [`dispatch::JobQueue`], and [`audit::AuditSink`] traits, so the pipeline
//! is fully testable with in-memory fakes.

pub mod audit;
pub mod batch;
pub mod cache;
pub mod dispatch;
pub mod error;
pub mod run;
pub mod source;
pub mod store;
pub mod strategy;
pub mod transform;
pub mod verify;

pub use error::ImportError;
pub use run::{run_import, ImportRequest, PipelineDeps};

//! Import pipeline error taxonomy.
//!
//! Row-level problems (missing fields, unknown references, duplicate keys)
//! are data, not errors: they accumulate in the run result and never abort
//! a run. Everything in this enum is fatal to the run that raised it.

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Wrong extension, unreadable workbook, or structurally wrong header.
    /// Raised before any data row is streamed.
    #[error("Unsupported or unparsable file: {0}")]
    FileFormat(String),

    /// A batch failed to commit. Per-row errors never reach the load
    /// layer, so this always indicates an infrastructure or configuration
    /// problem. Already-committed batches stay committed.
    #[error("Batch {batch} failed to commit: {message}")]
    BatchTransaction { batch: usize, message: String },

    /// Post-load count verification failed (scoped-replace only). The
    /// pre-delete snapshot has been restored best-effort before this
    /// error surfaces.
    #[error("Database count mismatch after load: expected {expected}, found {actual}")]
    CountMismatch { expected: i64, actual: i64 },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Job queue error: {0}")]
    Queue(String),

    #[error("Audit log error: {0}")]
    Audit(String),
}

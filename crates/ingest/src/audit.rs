//! Audit logging seam.

use async_trait::async_trait;

use crate::error::ImportError;

/// Summary of one completed import run, persisted append-only. The audit
/// log is the system of record for "time of last import per report type".
#[derive(Debug, Clone)]
pub struct RunAuditEntry {
    pub report_type: String,
    /// Human-readable label for the uploaded file (original file name).
    pub file_label: String,
    pub total_rows: i64,
    pub db_count_before: i64,
    pub db_count_after: i64,
    pub inserted_count: i64,
    pub updated_count: i64,
    pub error_count: i64,
}

/// Persists run summaries. One entry per run, written after the full
/// stream completes -- including partial-error runs (`error_count > 0`).
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &RunAuditEntry) -> Result<(), ImportError>;
}

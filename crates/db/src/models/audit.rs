//! Import audit log entity and create DTO.
//!
//! Audit rows are immutable once created (no updated_at).

use serde::Serialize;
use sqlx::FromRow;

use finback_core::types::{DbId, Timestamp};

/// A row from `import_audit_logs`. Serializes in camelCase for the
/// status endpoint's response envelope.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportAuditLog {
    pub id: DbId,
    pub report_type: String,
    pub file_label: String,
    pub total_rows: i64,
    pub db_count_before: i64,
    pub db_count_after: i64,
    pub inserted_count: i64,
    pub updated_count: i64,
    pub error_count: i64,
    pub created_at: Timestamp,
}

/// DTO for appending one audit entry.
#[derive(Debug, Clone)]
pub struct CreateImportAuditLog {
    pub report_type: String,
    pub file_label: String,
    pub total_rows: i64,
    pub db_count_before: i64,
    pub db_count_after: i64,
    pub inserted_count: i64,
    pub updated_count: i64,
    pub error_count: i64,
}

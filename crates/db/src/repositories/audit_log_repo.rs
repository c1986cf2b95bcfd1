//! Repository for the append-only `import_audit_logs` table.

use sqlx::PgPool;

use crate::models::audit::{CreateImportAuditLog, ImportAuditLog};

/// Column list for `import_audit_logs` queries.
const COLUMNS: &str = "\
    id, report_type, file_label, total_rows, \
    db_count_before, db_count_after, \
    inserted_count, updated_count, error_count, created_at";

/// Maximum page size for the status listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for the status listing.
const DEFAULT_LIMIT: i64 = 20;

pub struct AuditLogRepo;

impl AuditLogRepo {
    /// Append one audit entry. There is no update path; the table is
    /// insert-only.
    pub async fn insert(
        pool: &PgPool,
        entry: &CreateImportAuditLog,
    ) -> Result<ImportAuditLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO import_audit_logs \
             (report_type, file_label, total_rows, db_count_before, db_count_after, \
              inserted_count, updated_count, error_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ImportAuditLog>(&query)
            .bind(&entry.report_type)
            .bind(&entry.file_label)
            .bind(entry.total_rows)
            .bind(entry.db_count_before)
            .bind(entry.db_count_after)
            .bind(entry.inserted_count)
            .bind(entry.updated_count)
            .bind(entry.error_count)
            .fetch_one(pool)
            .await
    }

    /// The most recent run per report type, for the status endpoint.
    /// Types that have never run simply have no row here.
    pub async fn latest_per_type(pool: &PgPool) -> Result<Vec<ImportAuditLog>, sqlx::Error> {
        let query = format!(
            "SELECT DISTINCT ON (report_type) {COLUMNS} \
             FROM import_audit_logs \
             ORDER BY report_type, created_at DESC, id DESC"
        );
        sqlx::query_as::<_, ImportAuditLog>(&query)
            .fetch_all(pool)
            .await
    }

    /// Most recent runs, optionally filtered by report type.
    pub async fn list_recent(
        pool: &PgPool,
        report_type: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<ImportAuditLog>, sqlx::Error> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        match report_type {
            Some(report_type) => {
                let query = format!(
                    "SELECT {COLUMNS} FROM import_audit_logs \
                     WHERE report_type = $1 \
                     ORDER BY created_at DESC, id DESC LIMIT $2"
                );
                sqlx::query_as::<_, ImportAuditLog>(&query)
                    .bind(report_type)
                    .bind(limit)
                    .fetch_all(pool)
                    .await
            }
            None => {
                let query = format!(
                    "SELECT {COLUMNS} FROM import_audit_logs \
                     ORDER BY created_at DESC, id DESC LIMIT $1"
                );
                sqlx::query_as::<_, ImportAuditLog>(&query)
                    .bind(limit)
                    .fetch_all(pool)
                    .await
            }
        }
    }
}

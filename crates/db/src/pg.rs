//! Postgres implementations of the import pipeline's seams.
//!
//! Each adapter wraps the pool and delegates to a repository, translating
//! `sqlx::Error` into the pipeline's error taxonomy.

use async_trait::async_trait;
use finback_core::registry::RefKind;
use finback_core::types::DbId;
use finback_ingest::audit::{AuditSink, RunAuditEntry};
use finback_ingest::cache::ReferenceLookup;
use finback_ingest::dispatch::{DownstreamJob, JobQueue};
use finback_ingest::error::ImportError;
use finback_ingest::store::{ReportStore, Scope, StoredRow};

use crate::models::audit::CreateImportAuditLog;
use crate::models::job::EnqueueJob;
use crate::repositories::audit_log_repo::AuditLogRepo;
use crate::repositories::job_queue_repo::JobQueueRepo;
use crate::repositories::reference_repo::ReferenceRepo;
use crate::repositories::report_table_repo::ReportTableRepo;
use crate::DbPool;

fn store_error(error: sqlx::Error) -> ImportError {
    ImportError::Store(error.to_string())
}

pub struct PgReportStore {
    pool: DbPool,
}

impl PgReportStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn count(&self, table: &str) -> Result<i64, ImportError> {
        ReportTableRepo::count(&self.pool, table)
            .await
            .map_err(store_error)
    }

    async fn take_scope(
        &self,
        table: &str,
        columns: &[&str],
        scope: &Scope,
    ) -> Result<(Vec<StoredRow>, u64), ImportError> {
        ReportTableRepo::take_scope(&self.pool, table, columns, scope)
            .await
            .map_err(store_error)
    }

    async fn delete_scope(&self, table: &str, scope: &Scope) -> Result<u64, ImportError> {
        ReportTableRepo::delete_scope(&self.pool, table, scope)
            .await
            .map_err(store_error)
    }

    async fn truncate(&self, table: &str) -> Result<(), ImportError> {
        ReportTableRepo::truncate(&self.pool, table)
            .await
            .map_err(store_error)
    }

    async fn insert_batch(
        &self,
        table: &str,
        columns: &[&str],
        rows: &[StoredRow],
    ) -> Result<u64, ImportError> {
        ReportTableRepo::insert_rows(&self.pool, table, columns, rows)
            .await
            .map_err(store_error)
    }

    async fn upsert_batch(
        &self,
        table: &str,
        columns: &[&str],
        key_columns: &[&str],
        rows: &[StoredRow],
    ) -> Result<u64, ImportError> {
        ReportTableRepo::upsert_rows(&self.pool, table, columns, key_columns, rows)
            .await
            .map_err(store_error)
    }

    async fn existing_keys(
        &self,
        table: &str,
        key_columns: &[&str],
        candidate_keys: &[String],
    ) -> Result<Vec<String>, ImportError> {
        ReportTableRepo::existing_keys(&self.pool, table, key_columns, candidate_keys)
            .await
            .map_err(store_error)
    }
}

pub struct PgReferenceLookup {
    pool: DbPool,
}

impl PgReferenceLookup {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReferenceLookup for PgReferenceLookup {
    async fn resolve(&self, kind: RefKind, code: &str) -> Result<Option<DbId>, ImportError> {
        let result = match kind {
            RefKind::Client => ReferenceRepo::client_id_by_code(&self.pool, code).await,
            RefKind::Scrip => ReferenceRepo::scrip_id_by_code(&self.pool, code).await,
        };
        result.map_err(store_error)
    }
}

pub struct PgJobQueue {
    pool: DbPool,
}

impl PgJobQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: &DownstreamJob) -> Result<bool, ImportError> {
        JobQueueRepo::enqueue(
            &self.pool,
            &EnqueueJob {
                name: job.name.clone(),
                payload: job.payload.clone(),
                idempotency_key: job.idempotency_key.clone(),
                max_attempts: job.max_attempts,
                backoff_secs: job.backoff_secs,
                delay_secs: job.delay_secs,
            },
        )
        .await
        .map_err(|e| ImportError::Queue(e.to_string()))
    }
}

pub struct PgAuditSink {
    pool: DbPool,
}

impl PgAuditSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, entry: &RunAuditEntry) -> Result<(), ImportError> {
        AuditLogRepo::insert(
            &self.pool,
            &CreateImportAuditLog {
                report_type: entry.report_type.clone(),
                file_label: entry.file_label.clone(),
                total_rows: entry.total_rows,
                db_count_before: entry.db_count_before,
                db_count_after: entry.db_count_after,
                inserted_count: entry.inserted_count,
                updated_count: entry.updated_count,
                error_count: entry.error_count,
            },
        )
        .await
        .map_err(|e| ImportError::Audit(e.to_string()))?;
        Ok(())
    }
}

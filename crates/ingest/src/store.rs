//! Store seam for the load strategies.
//!
//! The pipeline never talks SQL directly; it drives this trait with the
//! report type's table/column configuration. The Postgres implementation
//! lives in `finback-db`; tests use an in-memory table.

use async_trait::async_trait;
use finback_core::rows::FieldValue;

use crate::error::ImportError;

/// One materialized row in the target table's insert column order.
pub type StoredRow = Vec<FieldValue>;

/// Scope filter for scope-partitioned tables: `(column, value)` pairs,
/// values already normalized (uppercased) request parameters.
pub type Scope = Vec<(String, String)>;

/// Storage operations the load strategies need.
///
/// Atomicity contract: `insert_batch` and `upsert_batch` each commit all
/// of their rows in one transaction or none of them; `take_scope` performs
/// its snapshot and delete in one transaction.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Total rows currently in `table`.
    async fn count(&self, table: &str) -> Result<i64, ImportError>;

    /// Atomically capture all rows matching `scope` (in `columns` order)
    /// and delete them. Returns the snapshot and the deleted count.
    async fn take_scope(
        &self,
        table: &str,
        columns: &[&str],
        scope: &Scope,
    ) -> Result<(Vec<StoredRow>, u64), ImportError>;

    /// Delete all rows matching `scope`. Used by compensation before
    /// reinserting a snapshot, so a half-restored scope converges.
    async fn delete_scope(&self, table: &str, scope: &Scope) -> Result<u64, ImportError>;

    /// Remove every row from `table` (replace-all preparation).
    async fn truncate(&self, table: &str) -> Result<(), ImportError>;

    /// Insert `rows` (in `columns` order) inside one transaction.
    async fn insert_batch(
        &self,
        table: &str,
        columns: &[&str],
        rows: &[StoredRow],
    ) -> Result<u64, ImportError>;

    /// Insert-or-update `rows` on the table's unique index over
    /// `key_columns`, inside one transaction. Conflict resolution is the
    /// store's own (`ON CONFLICT ... DO UPDATE`); the split into
    /// inserted/updated counts is computed separately by the caller.
    async fn upsert_batch(
        &self,
        table: &str,
        columns: &[&str],
        key_columns: &[&str],
        rows: &[StoredRow],
    ) -> Result<u64, ImportError>;

    /// Of `candidate_keys` (composite keys built with the pipeline's
    /// normalization), return those that already exist in `table`.
    async fn existing_keys(
        &self,
        table: &str,
        key_columns: &[&str],
        candidate_keys: &[String],
    ) -> Result<Vec<String>, ImportError>;
}

//! In-memory fakes for the pipeline's store, lookup, queue, and audit
//! seams, mirroring the real Postgres implementations closely enough to
//! exercise every load strategy without a database.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use finback_core::keys::{KEY_SEPARATOR, NULL_SENTINEL};
use finback_core::registry::RefKind;
use finback_core::rows::FieldValue;
use finback_core::types::DbId;
use finback_ingest::audit::{AuditSink, RunAuditEntry};
use finback_ingest::cache::ReferenceLookup;
use finback_ingest::dispatch::{DownstreamJob, JobQueue};
use finback_ingest::error::ImportError;
use finback_ingest::store::{ReportStore, Scope, StoredRow};

// ── Store ────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryTable {
    columns: Vec<String>,
    rows: Vec<StoredRow>,
}

impl MemoryTable {
    fn col(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    fn key_of(&self, row: &StoredRow, key_columns: &[&str]) -> String {
        key_columns
            .iter()
            .map(|col| {
                self.col(col)
                    .and_then(|idx| row[idx].key_text())
                    .unwrap_or_else(|| NULL_SENTINEL.to_string())
            })
            .collect::<Vec<_>>()
            .join(KEY_SEPARATOR)
    }
}

/// Table-per-name in-memory store with write-failure and count-skew
/// injection for the failure-path tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, MemoryTable>>,
    insert_calls: Mutex<usize>,
    upsert_calls: Mutex<usize>,
    /// Fail this (1-based) insert_batch call once, then succeed again.
    fail_insert_call: Mutex<Option<usize>>,
    /// Added to count() results after the first call, so the pre-run count
    /// stays honest but verification sees a discrepancy.
    count_skew_after_first: Mutex<i64>,
    count_calls: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_insert_call(&self, call: usize) {
        *self.fail_insert_call.lock().unwrap() = Some(call);
    }

    pub fn skew_counts_after_first(&self, by: i64) {
        *self.count_skew_after_first.lock().unwrap() = by;
    }

    pub fn insert_calls(&self) -> usize {
        *self.insert_calls.lock().unwrap()
    }

    pub fn upsert_calls(&self) -> usize {
        *self.upsert_calls.lock().unwrap()
    }

    pub fn rows_of(&self, table: &str) -> Vec<StoredRow> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Seed a table directly (simulating pre-existing data).
    pub fn seed(&self, table: &str, columns: &[&str], rows: Vec<StoredRow>) {
        let mut tables = self.tables.lock().unwrap();
        let entry = tables.entry(table.to_string()).or_default();
        entry.columns = columns.iter().map(|c| c.to_string()).collect();
        entry.rows = rows;
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn count(&self, table: &str) -> Result<i64, ImportError> {
        let real = self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.rows.len() as i64)
            .unwrap_or(0);
        let call = {
            let mut calls = self.count_calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if call > 1 {
            Ok(real + *self.count_skew_after_first.lock().unwrap())
        } else {
            Ok(real)
        }
    }

    async fn take_scope(
        &self,
        table: &str,
        columns: &[&str],
        scope: &Scope,
    ) -> Result<(Vec<StoredRow>, u64), ImportError> {
        let mut tables = self.tables.lock().unwrap();
        let entry = tables.entry(table.to_string()).or_default();
        if entry.columns.is_empty() {
            entry.columns = columns.iter().map(|c| c.to_string()).collect();
        }

        let column_names = entry.columns.clone();
        let (taken, kept): (Vec<StoredRow>, Vec<StoredRow>) = std::mem::take(&mut entry.rows)
            .into_iter()
            .partition(|row| row_in_scope(&column_names, row, scope));
        let deleted = taken.len() as u64;
        entry.rows = kept;
        Ok((taken, deleted))
    }

    async fn delete_scope(&self, table: &str, scope: &Scope) -> Result<u64, ImportError> {
        let mut tables = self.tables.lock().unwrap();
        let Some(entry) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = entry.rows.len();
        let column_names = entry.columns.clone();
        entry
            .rows
            .retain(|row| !row_in_scope(&column_names, row, scope));
        Ok((before - entry.rows.len()) as u64)
    }

    async fn truncate(&self, table: &str) -> Result<(), ImportError> {
        if let Some(entry) = self.tables.lock().unwrap().get_mut(table) {
            entry.rows.clear();
        }
        Ok(())
    }

    async fn insert_batch(
        &self,
        table: &str,
        columns: &[&str],
        rows: &[StoredRow],
    ) -> Result<u64, ImportError> {
        let call = {
            let mut calls = self.insert_calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if *self.fail_insert_call.lock().unwrap() == Some(call) {
            return Err(ImportError::Store("injected write failure".to_string()));
        }

        let mut tables = self.tables.lock().unwrap();
        let entry = tables.entry(table.to_string()).or_default();
        if entry.columns.is_empty() {
            entry.columns = columns.iter().map(|c| c.to_string()).collect();
        }
        entry.rows.extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }

    async fn upsert_batch(
        &self,
        table: &str,
        columns: &[&str],
        key_columns: &[&str],
        rows: &[StoredRow],
    ) -> Result<u64, ImportError> {
        *self.upsert_calls.lock().unwrap() += 1;

        let mut tables = self.tables.lock().unwrap();
        let entry = tables.entry(table.to_string()).or_default();
        if entry.columns.is_empty() {
            entry.columns = columns.iter().map(|c| c.to_string()).collect();
        }

        for row in rows {
            let key = entry.key_of(row, key_columns);
            let existing = entry
                .rows
                .iter()
                .position(|r| entry.key_of(r, key_columns) == key);
            match existing {
                Some(idx) => entry.rows[idx] = row.clone(),
                None => entry.rows.push(row.clone()),
            }
        }
        Ok(rows.len() as u64)
    }

    async fn existing_keys(
        &self,
        table: &str,
        key_columns: &[&str],
        candidate_keys: &[String],
    ) -> Result<Vec<String>, ImportError> {
        let tables = self.tables.lock().unwrap();
        let Some(entry) = tables.get(table) else {
            return Ok(Vec::new());
        };
        let present: HashSet<String> = entry
            .rows
            .iter()
            .map(|row| entry.key_of(row, key_columns))
            .collect();
        Ok(candidate_keys
            .iter()
            .filter(|k| present.contains(*k))
            .cloned()
            .collect())
    }
}

fn row_in_scope(columns: &[String], row: &StoredRow, scope: &Scope) -> bool {
    scope.iter().all(|(field, value)| {
        columns
            .iter()
            .position(|c| c == field)
            .map(|idx| row[idx].as_text() == Some(value.as_str()))
            .unwrap_or(false)
    })
}

// ── Lookup ───────────────────────────────────────────────────────────

/// Static code -> id reference lookup.
#[derive(Default)]
pub struct MapLookup {
    entries: HashMap<(RefKind, String), DbId>,
}

impl MapLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: RefKind, code: &str, id: DbId) -> Self {
        self.entries.insert((kind, code.to_string()), id);
        self
    }
}

#[async_trait]
impl ReferenceLookup for MapLookup {
    async fn resolve(&self, kind: RefKind, code: &str) -> Result<Option<DbId>, ImportError> {
        Ok(self.entries.get(&(kind, code.to_string())).copied())
    }
}

// ── Queue ────────────────────────────────────────────────────────────

/// Queue fake that records jobs and deduplicates on the idempotency key,
/// like the Postgres queue's unique index.
#[derive(Default)]
pub struct RecordingQueue {
    pub jobs: Mutex<Vec<DownstreamJob>>,
    seen: Mutex<HashSet<String>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_names(&self) -> Vec<String> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .map(|j| j.name.clone())
            .collect()
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, job: &DownstreamJob) -> Result<bool, ImportError> {
        if !self.seen.lock().unwrap().insert(job.idempotency_key.clone()) {
            return Ok(false);
        }
        self.jobs.lock().unwrap().push(job.clone());
        Ok(true)
    }
}

// ── Audit ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryAudit {
    pub entries: Mutex<Vec<RunAuditEntry>>,
}

impl MemoryAudit {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditSink for MemoryAudit {
    async fn record(&self, entry: &RunAuditEntry) -> Result<(), ImportError> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

// ── Row helpers ──────────────────────────────────────────────────────

pub fn text(s: &str) -> FieldValue {
    FieldValue::Text(s.to_string())
}

//! The three load strategies.
//!
//! Exactly one strategy applies per report type, selected by its registry
//! entry. A strategy has three phases: `prepare` (once, before the first
//! batch -- truncate, or snapshot + delete the scope), `load_batch` (once
//! per batch, transactional), and `finish` (count verification). Batches
//! are committed strictly sequentially by the orchestrator.

use finback_core::keys::{composite_key, DedupTracker};
use finback_core::registry::{LoadStrategyKind, ReportTypeConfig};
use finback_core::rows::{CanonicalRow, Duplicate};

use crate::error::ImportError;
use crate::store::{ReportStore, Scope, StoredRow};
use crate::verify;

/// Rows per statement within one upsert transaction (bind-parameter
/// headroom for wide tables).
pub const UPSERT_SUB_BATCH: usize = 200;

/// What one batch load did.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub inserted: u64,
    pub updated: u64,
    pub duplicates: Vec<Duplicate>,
}

/// Per-run state of the scoped-replace strategy.
struct ScopedState {
    snapshot: Vec<StoredRow>,
    deleted: u64,
    /// Dedup scope is the whole run for scoped-replace.
    tracker: DedupTracker,
    inserted_total: i64,
}

enum Inner {
    ReplaceAll,
    ScopedReplace(ScopedState),
    DedupUpsert,
}

pub struct LoadStrategy {
    inner: Inner,
}

impl LoadStrategy {
    pub fn for_config(config: &ReportTypeConfig) -> Self {
        let inner = match config.strategy {
            LoadStrategyKind::ReplaceAll => Inner::ReplaceAll,
            LoadStrategyKind::ScopedReplace => Inner::ScopedReplace(ScopedState {
                snapshot: Vec::new(),
                deleted: 0,
                tracker: DedupTracker::new(),
                inserted_total: 0,
            }),
            LoadStrategyKind::DedupUpsert => Inner::DedupUpsert,
        };
        Self { inner }
    }

    /// Run once before the first batch. Returns the table count captured
    /// before any destructive operation (for the audit log and for
    /// scoped-replace verification).
    pub async fn prepare(
        &mut self,
        store: &dyn ReportStore,
        config: &'static ReportTypeConfig,
        scope: &Scope,
    ) -> Result<i64, ImportError> {
        let db_count_before = store.count(config.table).await?;

        match &mut self.inner {
            Inner::ReplaceAll => {
                store.truncate(config.table).await?;
                tracing::info!(table = config.table, rows = db_count_before, "Truncated for replace-all load");
            }
            Inner::ScopedReplace(state) => {
                let (snapshot, deleted) =
                    store.take_scope(config.table, config.columns, scope).await?;
                tracing::info!(
                    table = config.table,
                    deleted,
                    "Captured and cleared scope for scoped-replace load"
                );
                state.snapshot = snapshot;
                state.deleted = deleted;
            }
            Inner::DedupUpsert => {}
        }

        Ok(db_count_before)
    }

    /// Commit one batch. `rows` contains only valid, transformed rows.
    pub async fn load_batch(
        &mut self,
        store: &dyn ReportStore,
        config: &'static ReportTypeConfig,
        scope: &Scope,
        batch_index: usize,
        rows: Vec<CanonicalRow>,
    ) -> Result<LoadOutcome, ImportError> {
        let mut outcome = LoadOutcome::default();
        if rows.is_empty() {
            return Ok(outcome);
        }

        match &mut self.inner {
            Inner::ReplaceAll => {
                let stored: Vec<StoredRow> =
                    rows.iter().map(|r| materialize(r, config.columns)).collect();
                let inserted = store
                    .insert_batch(config.table, config.columns, &stored)
                    .await
                    .map_err(|e| batch_failure(batch_index, e))?;
                outcome.inserted = inserted;
            }

            Inner::ScopedReplace(state) => {
                let mut stored = Vec::with_capacity(rows.len());
                for row in &rows {
                    let key = composite_key(row, config.unique_key, scope);
                    match state.tracker.check(row.row_number, &key) {
                        Some(duplicate) => outcome.duplicates.push(duplicate),
                        None => stored.push(materialize(row, config.columns)),
                    }
                }

                let inserted = store
                    .insert_batch(config.table, config.columns, &stored)
                    .await
                    .map_err(|e| batch_failure(batch_index, e))?;
                state.inserted_total += inserted as i64;
                outcome.inserted = inserted;
            }

            Inner::DedupUpsert => {
                // Dedup scope is the batch for this strategy.
                let mut tracker = DedupTracker::new();
                let mut survivors: Vec<(String, StoredRow)> = Vec::with_capacity(rows.len());
                for row in &rows {
                    let key = composite_key(row, config.unique_key, scope);
                    match tracker.check(row.row_number, &key) {
                        Some(duplicate) => outcome.duplicates.push(duplicate),
                        None => survivors.push((key, materialize(row, config.columns))),
                    }
                }

                // Existence split is for count reporting only; the store's
                // conflict resolution does the actual insert-or-update.
                let keys: Vec<String> = survivors.iter().map(|(k, _)| k.clone()).collect();
                let existing = store
                    .existing_keys(config.table, config.unique_key, &keys)
                    .await?;
                let updated = survivors
                    .iter()
                    .filter(|(k, _)| existing.contains(k))
                    .count() as u64;
                outcome.updated = updated;
                outcome.inserted = survivors.len() as u64 - updated;

                let stored: Vec<StoredRow> = survivors.into_iter().map(|(_, r)| r).collect();
                store
                    .upsert_batch(config.table, config.columns, config.unique_key, &stored)
                    .await
                    .map_err(|e| batch_failure(batch_index, e))?;
            }
        }

        Ok(outcome)
    }

    /// Best-effort rollback after a fatal mid-run failure (e.g. a batch
    /// transaction error). Only scoped-replace compensates -- it restores
    /// the scope's pre-run snapshot; the other strategies leave
    /// already-committed batches in place.
    pub async fn abort(
        &self,
        store: &dyn ReportStore,
        config: &'static ReportTypeConfig,
        scope: &Scope,
    ) {
        if let Inner::ScopedReplace(state) = &self.inner {
            if let Err(e) =
                verify::restore_snapshot(store, config, scope, &state.snapshot).await
            {
                tracing::error!(table = config.table, error = %e, "Snapshot restoration failed");
            }
        }
    }

    /// Post-stream verification. Returns the final table count; for
    /// scoped-replace a count mismatch restores the snapshot (best
    /// effort) and fails the run.
    pub async fn finish(
        &self,
        store: &dyn ReportStore,
        config: &'static ReportTypeConfig,
        scope: &Scope,
        db_count_before: i64,
    ) -> Result<i64, ImportError> {
        match &self.inner {
            Inner::ScopedReplace(state) => {
                verify::verify_scoped(
                    store,
                    config,
                    scope,
                    db_count_before,
                    state.deleted as i64,
                    state.inserted_total,
                    &state.snapshot,
                )
                .await
            }
            _ => store.count(config.table).await,
        }
    }
}

/// Materialize a canonical row in the table's insert column order.
/// Fields the row does not carry come out as `Null`.
fn materialize(row: &CanonicalRow, columns: &[&str]) -> StoredRow {
    columns.iter().map(|col| row.get(col).clone()).collect()
}

fn batch_failure(batch_index: usize, error: ImportError) -> ImportError {
    match error {
        ImportError::Store(message) => ImportError::BatchTransaction {
            batch: batch_index,
            message,
        },
        other => other,
    }
}

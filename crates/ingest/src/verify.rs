//! Post-load consistency verification and compensation (scoped-replace).
//!
//! The scoped-replace lifetime spans the scope snapshot/delete and N batch
//! transactions, so it is not one atomic unit. The verifier is the safety
//! net: the final table count must equal the analytically predicted count,
//! otherwise the run is treated as silent-corruption risk -- the scope is
//! rolled back to its pre-run snapshot (best effort) and the run fails.

use finback_core::registry::ReportTypeConfig;

use crate::error::ImportError;
use crate::store::{ReportStore, Scope, StoredRow};

/// Verify `count == db_count_before - deleted + inserted`; on mismatch,
/// restore the snapshot and fail with [`ImportError::CountMismatch`].
///
/// Compensation first re-deletes the scope, so it converges on the
/// pre-run state even when a previous compensation attempt was
/// interrupted partway through reinsertion.
pub async fn verify_scoped(
    store: &dyn ReportStore,
    config: &'static ReportTypeConfig,
    scope: &Scope,
    db_count_before: i64,
    deleted: i64,
    inserted: i64,
    snapshot: &[StoredRow],
) -> Result<i64, ImportError> {
    let expected = db_count_before - deleted + inserted;
    let actual = store.count(config.table).await?;

    if actual == expected {
        return Ok(actual);
    }

    tracing::error!(
        table = config.table,
        expected,
        actual,
        "Count mismatch after scoped-replace load, restoring snapshot"
    );

    if let Err(e) = restore_snapshot(store, config, scope, snapshot).await {
        // Best effort only; the mismatch is the error that surfaces.
        tracing::error!(table = config.table, error = %e, "Snapshot restoration failed");
    }

    Err(ImportError::CountMismatch { expected, actual })
}

pub(crate) async fn restore_snapshot(
    store: &dyn ReportStore,
    config: &'static ReportTypeConfig,
    scope: &Scope,
    snapshot: &[StoredRow],
) -> Result<(), ImportError> {
    store.delete_scope(config.table, scope).await?;
    if !snapshot.is_empty() {
        store
            .insert_batch(config.table, config.columns, snapshot)
            .await?;
    }
    tracing::info!(
        table = config.table,
        restored = snapshot.len(),
        "Scope restored to pre-run snapshot"
    );
    Ok(())
}

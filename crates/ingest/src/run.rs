//! Pipeline orchestrator.
//!
//! One call per upload request. The run is a single logical task that
//! interleaves pull-based backpressure (the source only advances when the
//! next batch is requested) with bounded parallel transforms and strictly
//! sequential batch commits -- one batch's transaction finishes before the
//! next batch is accumulated, because later batches may reference rows
//! created by earlier ones.
//!
//! There is no cancellation API: a fatal error aborts the remaining
//! stream immediately, and already-committed batches stay committed (only
//! scoped-replace compensates, and only within its own scope).

use chrono::NaiveDate;
use finback_core::mapping::HeaderMap;
use finback_core::registry::ReportTypeConfig;
use finback_core::rows::{clean_cell, FieldValue, RowError};
use finback_core::summary::ImportRunResult;

use crate::audit::{AuditSink, RunAuditEntry};
use crate::batch::BatchAccumulator;
use crate::cache::{ReferenceCache, ReferenceLookup};
use crate::dispatch::{self, JobQueue};
use crate::error::ImportError;
use crate::source::RowSource;
use crate::store::{ReportStore, Scope};
use crate::strategy::LoadStrategy;
use crate::transform;

/// One upload to import.
pub struct ImportRequest {
    pub config: &'static ReportTypeConfig,
    /// Original upload file name (extension selects the parser; the name
    /// becomes the audit log's file label).
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Scope parameter values for scope-partitioned types, keyed by the
    /// config's scope field names.
    pub scope: Scope,
    /// Business date used for downstream job idempotency keys.
    pub business_date: NaiveDate,
}

/// The pipeline's external collaborators.
pub struct PipelineDeps<'a> {
    pub store: &'a dyn ReportStore,
    pub lookup: &'a dyn ReferenceLookup,
    pub queue: &'a dyn JobQueue,
    pub audit: &'a dyn AuditSink,
}

/// Run one import end to end: parse, map/validate, transform, load,
/// verify, audit, dispatch. Returns the structured result; fatal errors
/// abort with whatever was committed so far left in place.
pub async fn run_import(
    deps: &PipelineDeps<'_>,
    request: ImportRequest,
) -> Result<ImportRunResult, ImportError> {
    let config = request.config;

    // Normalize scope values the same way cells are cleaned, so stored
    // scope columns and composite keys line up with file-derived values.
    let scope: Scope = request
        .scope
        .iter()
        .map(|(field, value)| (field.clone(), clean_cell(value)))
        .collect();

    let missing_scope: Vec<&str> = config
        .scope_fields
        .iter()
        .filter(|field| !scope.iter().any(|(f, v)| f == *field && !v.is_empty()))
        .copied()
        .collect();
    if !missing_scope.is_empty() {
        return Err(ImportError::FileFormat(format!(
            "missing scope parameter(s): {}",
            missing_scope.join(", ")
        )));
    }

    tracing::info!(
        report_type = config.key,
        file = %request.file_name,
        strategy = config.strategy.as_str(),
        "Starting import run"
    );

    // Fail fast before streaming: extension, readability, and header shape.
    let (source, header_cells) = RowSource::open(&request.file_name, request.bytes)?;
    let header = HeaderMap::resolve(&header_cells, config).map_err(|missing| {
        ImportError::FileFormat(format!("missing required column(s): {}", missing.join(", ")))
    })?;

    let mut accumulator = BatchAccumulator::new(source, header);
    let mut strategy = LoadStrategy::for_config(config);
    let mut result = ImportRunResult::default();

    let db_count_before = strategy.prepare(deps.store, config, &scope).await?;

    if let Err(error) = drive_batches(
        deps,
        config,
        &scope,
        &mut accumulator,
        &mut strategy,
        &mut result,
    )
    .await
    {
        tracing::error!(
            report_type = config.key,
            error = %error,
            inserted = result.inserted_count,
            errors = result.error_count,
            "Import run aborted"
        );
        strategy.abort(deps.store, config, &scope).await;
        return Err(error);
    }

    result.db_count_after = strategy
        .finish(deps.store, config, &scope, db_count_before)
        .await?;

    deps.audit
        .record(&RunAuditEntry {
            report_type: config.key.to_string(),
            file_label: request.file_name.clone(),
            total_rows: result.total_rows as i64,
            db_count_before,
            db_count_after: result.db_count_after,
            inserted_count: result.inserted_count as i64,
            updated_count: result.updated_count as i64,
            error_count: result.error_count as i64,
        })
        .await?;

    let jobs = dispatch::build_jobs(config, &scope, request.business_date);
    dispatch::dispatch_jobs(deps.queue, &jobs).await?;

    tracing::info!(
        report_type = config.key,
        total = result.total_rows,
        loaded = result.loaded_count(),
        inserted = result.inserted_count,
        updated = result.updated_count,
        errors = result.error_count,
        db_count = result.db_count_after,
        "Import run completed"
    );

    Ok(result)
}

/// Accumulate, transform, and commit batches strictly in file order.
/// At most one batch is in flight: the source does not advance until the
/// previous batch's transaction has committed.
async fn drive_batches(
    deps: &PipelineDeps<'_>,
    config: &'static ReportTypeConfig,
    scope: &Scope,
    accumulator: &mut BatchAccumulator,
    strategy: &mut LoadStrategy,
    result: &mut ImportRunResult,
) -> Result<(), ImportError> {
    // The reference cache lives exactly as long as this run.
    let cache = ReferenceCache::new();
    let mut batch_index = 0usize;

    while let Some(batch) = accumulator.next_batch(result)? {
        batch_index += 1;

        let transformed = transform::transform_batch(batch, config, deps.lookup, &cache).await?;

        let mut valid = Vec::with_capacity(transformed.len());
        for row in transformed {
            match row.error {
                Some(reason) => result.record_error(RowError {
                    row: row.row_number,
                    fields: vec![reason],
                }),
                None => valid.push(row),
            }
        }

        // Scope columns come from the request, not the file.
        for row in &mut valid {
            for (field, value) in scope {
                row.set(field, FieldValue::Text(value.clone()));
            }
        }

        let outcome = strategy
            .load_batch(deps.store, config, scope, batch_index, valid)
            .await?;

        result.inserted_count += outcome.inserted;
        result.updated_count += outcome.updated;
        for duplicate in outcome.duplicates {
            result.record_duplicate(duplicate);
        }

        tracing::debug!(
            report_type = config.key,
            batch = batch_index,
            inserted = result.inserted_count,
            updated = result.updated_count,
            errors = result.error_count,
            "Batch committed"
        );
    }

    Ok(())
}

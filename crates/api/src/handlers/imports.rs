//! Report upload and import status handlers.

use std::collections::HashMap;

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use chrono::{NaiveDate, Utc};
use finback_core::error::CoreError;
use finback_core::registry;
use finback_core::summary::ImportRunResult;
use finback_db::models::audit::ImportAuditLog;
use finback_db::pg::{PgAuditSink, PgJobQueue, PgReferenceLookup, PgReportStore};
use finback_db::repositories::audit_log_repo::AuditLogRepo;
use finback_ingest::{run_import, ImportRequest, PipelineDeps};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/imports/{report_type} -- upload and import a report file.
///
/// The file is the first multipart field carrying a filename. Scope
/// parameters (for scope-partitioned report types) and an optional
/// `business_date` (YYYY-MM-DD, defaults to today) come from the query
/// string, e.g. `?financial_year=2024-25&region=west`.
///
/// The import runs to completion before the response is produced, so the
/// returned counts reflect the committed state.
pub async fn upload_report(
    State(state): State<AppState>,
    Path(report_type): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    mut multipart: Multipart,
) -> AppResult<Json<DataResponse<ImportRunResult>>> {
    let config = registry::find_report_type(&report_type).ok_or(CoreError::NotFound {
        entity: "report type",
        key: report_type,
    })?;

    let business_date = match params.get("business_date") {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            AppError::BadRequest(format!("invalid business_date '{raw}', expected YYYY-MM-DD"))
        })?,
        None => Utc::now().date_naive(),
    };

    // Absent scope parameters are passed through empty; the pipeline
    // rejects them with a precise message before any parsing happens.
    let scope: Vec<(String, String)> = config
        .scope_fields
        .iter()
        .map(|field| {
            let value = params.get(*field).cloned().unwrap_or_default();
            (field.to_string(), value)
        })
        .collect();

    let (file_name, bytes) = read_upload(&mut multipart).await?;

    tracing::info!(
        report_type = config.key,
        file = %file_name,
        size = bytes.len(),
        "Received report upload"
    );

    let store = PgReportStore::new(state.pool.clone());
    let lookup = PgReferenceLookup::new(state.pool.clone());
    let queue = PgJobQueue::new(state.pool.clone());
    let audit = PgAuditSink::new(state.pool.clone());
    let deps = PipelineDeps {
        store: &store,
        lookup: &lookup,
        queue: &queue,
        audit: &audit,
    };

    let result = run_import(
        &deps,
        ImportRequest {
            config,
            file_name,
            bytes,
            scope,
            business_date,
        },
    )
    .await?;

    Ok(Json(DataResponse { data: result }))
}

/// Pull the uploaded file out of the multipart body: the first field that
/// carries a filename wins, the rest are ignored.
async fn read_upload(multipart: &mut Multipart) -> AppResult<(String, Vec<u8>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let Some(file_name) = field.file_name().map(|n| n.to_string()) else {
            continue;
        };

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("failed to read upload: {e}")))?;

        return Ok((file_name, bytes.to_vec()));
    }

    Err(AppError::BadRequest(
        "no file found in multipart body".to_string(),
    ))
}

/// Per-type status row: the most recent run, or nulls when the type has
/// never been imported.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTypeStatus {
    pub report_type: &'static str,
    pub label: &'static str,
    pub last_updated_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Human-readable counts summary, e.g. `"100 rows: 98 inserted, 0
    /// updated, 2 errors"`.
    pub message: Option<String>,
    pub last_run: Option<ImportAuditLog>,
}

fn counts_message(run: &ImportAuditLog) -> String {
    format!(
        "{} rows: {} inserted, {} updated, {} errors",
        run.total_rows, run.inserted_count, run.updated_count, run.error_count
    )
}

/// GET /api/v1/imports/status -- one entry per known report type with its
/// most recent run, nulls for types that have never run.
pub async fn import_status(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<ReportTypeStatus>>>> {
    let latest = AuditLogRepo::latest_per_type(&state.pool).await?;

    let statuses = registry::REPORT_TYPES
        .iter()
        .map(|config| {
            let last_run = latest.iter().find(|l| l.report_type == config.key).cloned();
            ReportTypeStatus {
                report_type: config.key,
                label: config.label,
                last_updated_at: last_run.as_ref().map(|l| l.created_at),
                message: last_run.as_ref().map(counts_message),
                last_run,
            }
        })
        .collect();

    Ok(Json(DataResponse { data: statuses }))
}

/// Query parameters for the run history listing.
#[derive(Deserialize)]
pub struct RunHistoryQuery {
    /// Restrict to a single report type key.
    pub report_type: Option<String>,
    /// Page size, clamped server-side.
    pub limit: Option<i64>,
}

/// GET /api/v1/imports/runs -- recent import runs, newest first.
pub async fn run_history(
    State(state): State<AppState>,
    Query(query): Query<RunHistoryQuery>,
) -> AppResult<Json<DataResponse<Vec<ImportAuditLog>>>> {
    let logs = AuditLogRepo::list_recent(
        &state.pool,
        query.report_type.as_deref(),
        query.limit,
    )
    .await?;

    Ok(Json(DataResponse { data: logs }))
}

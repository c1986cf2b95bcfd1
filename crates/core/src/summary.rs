//! Run summary accounting.

use serde::Serialize;

use crate::rows::{Duplicate, RowError};

/// The structured result of one import run, returned to the caller and
/// persisted (in summary form) to the audit log.
///
/// Row-level problems (validation failures, unknown references, duplicate
/// keys) accumulate here; they never abort the run. Serializes in
/// camelCase for the API response envelope.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRunResult {
    /// Data rows read from the file (header excluded).
    pub total_rows: u64,
    pub inserted_count: u64,
    pub updated_count: u64,
    /// Rejected rows: validation + transform + duplicates.
    pub error_count: u64,
    pub errors: Vec<RowError>,
    pub duplicates: Vec<Duplicate>,
    /// Target table count after the run completed.
    #[serde(rename = "dbCount")]
    pub db_count_after: i64,
}

impl ImportRunResult {
    pub fn record_error(&mut self, error: RowError) {
        self.error_count += 1;
        self.errors.push(error);
    }

    /// Duplicates count toward `error_count` but are listed separately so
    /// callers can distinguish "bad row" from "row already seen".
    pub fn record_duplicate(&mut self, duplicate: Duplicate) {
        self.error_count += 1;
        self.duplicates.push(duplicate);
    }

    /// Rows that made it into the store, by either path.
    pub fn loaded_count(&self) -> u64 {
        self.inserted_count + self.updated_count
    }
}

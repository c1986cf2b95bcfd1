//! Column mapping and per-row validation.
//!
//! The header row is resolved against the report type's column map once;
//! after that, mapping a row is index arithmetic. Validation only
//! classifies -- it never touches external state and never aborts the run.

use crate::registry::ReportTypeConfig;
use crate::rows::{clean_cell, CanonicalRow, FieldValue, RawRow, RowError};

/// Resolved header: canonical field name paired with its cell index.
#[derive(Debug, Clone)]
pub struct HeaderMap {
    fields: Vec<(&'static str, usize)>,
    required: &'static [&'static str],
}

impl HeaderMap {
    /// Resolve a cleaned header row against the config's column map.
    ///
    /// Returns the source column names that are missing when the file is
    /// structurally wrong (fail-fast, before any data row is read).
    pub fn resolve(
        header_cells: &[String],
        config: &'static ReportTypeConfig,
    ) -> Result<Self, Vec<String>> {
        let cleaned: Vec<String> = header_cells.iter().map(|c| clean_cell(c)).collect();

        let mut fields = Vec::with_capacity(config.column_map.len());
        let mut missing = Vec::new();

        for (source, canonical) in config.column_map {
            match cleaned.iter().position(|h| h == source) {
                Some(idx) => fields.push((*canonical, idx)),
                None if config.required.contains(canonical) => {
                    missing.push((*source).to_string());
                }
                // Optional columns may be absent; their fields read as Null.
                None => {}
            }
        }

        if missing.is_empty() {
            Ok(Self {
                fields,
                required: config.required,
            })
        } else {
            Err(missing)
        }
    }

    /// Map one raw row: clean cells, apply the column mapping, and check
    /// required canonical fields are present and non-empty.
    ///
    /// Failure produces a [`RowError`] carrying the row's 1-based file
    /// position and the missing field names; the row is then excluded from
    /// the batch.
    pub fn map_row(&self, raw: &RawRow) -> Result<CanonicalRow, RowError> {
        let mut row = CanonicalRow::new(raw.row_number);

        for (canonical, idx) in &self.fields {
            let value = match raw.cells.get(*idx) {
                Some(cell) => {
                    let cleaned = clean_cell(cell);
                    if cleaned.is_empty() {
                        FieldValue::Null
                    } else {
                        FieldValue::Text(cleaned)
                    }
                }
                None => FieldValue::Null,
            };
            row.set(canonical, value);
        }

        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|field| row.get(field).is_empty())
            .map(|field| (*field).to_string())
            .collect();

        if missing.is_empty() {
            Ok(row)
        } else {
            Err(RowError {
                row: raw.row_number,
                fields: missing,
            })
        }
    }
}

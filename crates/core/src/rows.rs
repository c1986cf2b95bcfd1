//! Canonical row types and cell cleaning.
//!
//! Raw spreadsheet cells arrive as untyped text. Every text cell is cleaned
//! (trimmed, stripped of quote characters, uppercased) before it is compared
//! or keyed, so that `"rel001 "` and `REL001` reconcile to the same value.

use serde::Serialize;
use std::collections::HashMap;

use crate::types::DbId;

/// A typed canonical field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Float(f64),
    Null,
}

impl FieldValue {
    /// Text content, or `None` for non-text values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// True for `Null` and for empty text.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// The normalized form used inside composite keys.
    ///
    /// Null and empty values are substituted with [`crate::keys::NULL_SENTINEL`]
    /// by the key builder; everything else renders as uppercase text.
    pub fn key_text(&self) -> Option<String> {
        match self {
            Self::Text(s) if !s.is_empty() => Some(s.to_uppercase()),
            Self::Int(v) => Some(v.to_string()),
            Self::Float(v) => Some(v.to_string()),
            _ => None,
        }
    }
}

/// A raw row pulled from the spreadsheet: untyped cells plus its 1-based
/// position in the file (header row included in the numbering).
#[derive(Debug, Clone)]
pub struct RawRow {
    pub row_number: usize,
    pub cells: Vec<String>,
}

/// A row after column mapping: canonical field name -> typed value.
///
/// `error` is set by transform when a reference lookup fails (e.g. unknown
/// scrip code). A row with `error` set never reaches a load strategy.
#[derive(Debug, Clone)]
pub struct CanonicalRow {
    pub row_number: usize,
    pub fields: HashMap<String, FieldValue>,
    pub error: Option<String>,
}

impl CanonicalRow {
    pub fn new(row_number: usize) -> Self {
        Self {
            row_number,
            fields: HashMap::new(),
            error: None,
        }
    }

    pub fn get(&self, field: &str) -> &FieldValue {
        self.fields.get(field).unwrap_or(&FieldValue::Null)
    }

    pub fn set(&mut self, field: &str, value: FieldValue) {
        self.fields.insert(field.to_string(), value);
    }

    pub fn set_id(&mut self, field: &str, id: DbId) {
        self.set(field, FieldValue::Int(id));
    }

    /// Mark the row as rejected by transform. Marking never aborts the run;
    /// the orchestrator converts marked rows into [`RowError`] entries.
    pub fn mark_error(&mut self, reason: impl Into<String>) {
        self.error = Some(reason.into());
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// One rejected row. Collected in the run result, never fatal.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RowError {
    /// 1-based row number in the uploaded file.
    pub row: usize,
    /// Missing/invalid canonical field names, or a single reason string
    /// from transform (e.g. `"unknown scrip: XYZ"`).
    pub fields: Vec<String>,
}

/// A row whose composite unique key collides with an earlier row in the
/// same run. Reported, never silently merged.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Duplicate {
    /// 1-based row number in the uploaded file.
    pub row: usize,
    /// The colliding composite key.
    pub key: String,
}

/// Clean one raw text cell: trim whitespace, strip quote characters, and
/// uppercase, so key comparisons are stable across export quirks.
pub fn clean_cell(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_uppercase()
}

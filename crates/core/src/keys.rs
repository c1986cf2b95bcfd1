//! Composite unique key construction and in-run duplicate detection.
//!
//! A report type's composite key is the ordered concatenation of its
//! configured unique-key fields, each normalized (uppercase/trimmed by cell
//! cleaning, null substituted with a sentinel), joined by a fixed
//! separator. For scope-partitioned types the scope values are appended so
//! the same logical row in two scopes never collides.

use std::collections::HashSet;

use crate::rows::{CanonicalRow, Duplicate};

/// Separator between key components.
pub const KEY_SEPARATOR: &str = "|";

/// Substituted for null/empty key components so `(A, null)` and `(A, "")`
/// produce the same, still-unambiguous key.
pub const NULL_SENTINEL: &str = "#NULL#";

/// Build the composite key for a row.
///
/// `key_fields` is order-significant; `scope` values (already normalized
/// request parameters) are appended after the field components.
pub fn composite_key(row: &CanonicalRow, key_fields: &[&str], scope: &[(String, String)]) -> String {
    let mut parts: Vec<String> = key_fields
        .iter()
        .map(|field| {
            row.get(field)
                .key_text()
                .unwrap_or_else(|| NULL_SENTINEL.to_string())
        })
        .collect();

    for (_, value) in scope {
        parts.push(value.to_uppercase());
    }

    parts.join(KEY_SEPARATOR)
}

/// Tracks composite keys seen so far; first occurrence wins, later rows
/// with the same key are reported as [`Duplicate`] and dropped from the
/// load set.
///
/// Scope of the tracker matches the strategy: one tracker per batch for
/// dedup-upsert, one per whole run for scoped-replace.
#[derive(Debug, Default)]
pub struct DedupTracker {
    seen: HashSet<String>,
}

impl DedupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key` for `row`. Returns a [`Duplicate`] if the key was
    /// already seen, `None` if this is the first occurrence.
    pub fn check(&mut self, row_number: usize, key: &str) -> Option<Duplicate> {
        if self.seen.insert(key.to_string()) {
            None
        } else {
            Some(Duplicate {
                row: row_number,
                key: key.to_string(),
            })
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

//! Bounded-concurrency row transformation.
//!
//! Valid rows within one batch are enriched in parallel up to
//! [`TRANSFORM_CONCURRENCY`] in-flight transforms. Transforms perform
//! reference lookups (which may hit the store), so the ceiling exists to
//! bound connection-pool usage; `buffered` keeps results in file order.
//!
//! A transform never throws for bad data: an unknown code or unparsable
//! number marks the row as errored, so one bad row cannot abort the batch.

use finback_core::registry::{RefKind, ReportTypeConfig};
use finback_core::rows::{CanonicalRow, FieldValue};
use futures::stream::{self, StreamExt, TryStreamExt};

use crate::cache::{ReferenceCache, ReferenceLookup};
use crate::error::ImportError;

/// Concurrent transforms per batch.
pub const TRANSFORM_CONCURRENCY: usize = 5;

/// Transform every row of a batch, preserving order.
///
/// Only infrastructure failures (lookup I/O errors) are returned as
/// `Err`; data problems come back as rows with the error marker set.
pub async fn transform_batch(
    batch: Vec<CanonicalRow>,
    config: &'static ReportTypeConfig,
    lookup: &dyn ReferenceLookup,
    cache: &ReferenceCache,
) -> Result<Vec<CanonicalRow>, ImportError> {
    stream::iter(batch)
        .map(|row| transform_row(row, config, lookup, cache))
        .buffered(TRANSFORM_CONCURRENCY)
        .try_collect()
        .await
}

/// Enrich and normalize one row: coerce configured numeric fields, then
/// resolve each configured reference code to its internal id.
async fn transform_row(
    mut row: CanonicalRow,
    config: &'static ReportTypeConfig,
    lookup: &dyn ReferenceLookup,
    cache: &ReferenceCache,
) -> Result<CanonicalRow, ImportError> {
    for field in config.numeric_fields {
        match row.get(field) {
            FieldValue::Text(text) => match text.parse::<f64>() {
                Ok(value) => row.set(field, FieldValue::Float(value)),
                Err(_) => {
                    let text = text.clone();
                    row.mark_error(format!("invalid number in {field}: {text}"));
                    return Ok(row);
                }
            },
            // Already typed or absent; required-ness was checked earlier.
            _ => {}
        }
    }

    for reference in config.reference_fields {
        let Some(code) = row.get(reference.source_field).as_text().map(String::from) else {
            // Optional reference column absent for this row.
            continue;
        };

        match cache.resolve(lookup, reference.kind, &code).await? {
            Some(id) => row.set_id(reference.target_field, id),
            None => {
                row.mark_error(format!("unknown {}: {code}", kind_label(reference.kind)));
                return Ok(row);
            }
        }
    }

    Ok(row)
}

fn kind_label(kind: RefKind) -> &'static str {
    match kind {
        RefKind::Scrip => "scrip",
        RefKind::Client => "client",
    }
}

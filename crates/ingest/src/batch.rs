//! Batch accumulation with explicit backpressure.
//!
//! The accumulator owns the row source and maps/validates rows as it pulls
//! them. A batch is handed out when it reaches [`BATCH_SIZE`] valid rows or
//! the input ends; the source does not advance again until the caller asks
//! for the next batch, so at most one batch is ever in flight through the
//! transform/load stages and batches are processed strictly in file order.

use finback_core::mapping::HeaderMap;
use finback_core::rows::CanonicalRow;
use finback_core::summary::ImportRunResult;

use crate::error::ImportError;
use crate::source::RowSource;

/// Rows per load transaction.
pub const BATCH_SIZE: usize = 1000;

pub struct BatchAccumulator {
    source: RowSource,
    header: HeaderMap,
    batch_size: usize,
}

impl BatchAccumulator {
    pub fn new(source: RowSource, header: HeaderMap) -> Self {
        Self {
            source,
            header,
            batch_size: BATCH_SIZE,
        }
    }

    #[cfg(test)]
    pub fn with_batch_size(source: RowSource, header: HeaderMap, batch_size: usize) -> Self {
        Self {
            source,
            header,
            batch_size,
        }
    }

    /// Pull, map, and validate rows until a full batch is accumulated or
    /// the input ends. Validation failures are recorded on `result` and
    /// excluded from the batch. Returns `None` once the input is exhausted.
    pub fn next_batch(
        &mut self,
        result: &mut ImportRunResult,
    ) -> Result<Option<Vec<CanonicalRow>>, ImportError> {
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut saw_rows = false;

        while batch.len() < self.batch_size {
            let Some(raw) = self.source.next_row()? else {
                break;
            };
            saw_rows = true;
            result.total_rows += 1;

            match self.header.map_row(&raw) {
                Ok(row) => batch.push(row),
                Err(row_error) => result.record_error(row_error),
            }
        }

        if batch.is_empty() && !saw_rows {
            Ok(None)
        } else {
            Ok(Some(batch))
        }
    }
}

//! Pull-based spreadsheet row source.
//!
//! Uploads arrive as raw bytes plus a file name; the extension selects the
//! parser (`.csv` via the csv crate, `.xls`/`.xlsx` via calamine). The
//! source yields rows one at a time through [`RowSource::next_row`] -- a
//! finite, one-pass, non-restartable sequence. Consumers pull; nothing is
//! produced while a batch is in the transform/load stage, which is what
//! makes backpressure an explicit control-flow step instead of a stream
//! side effect.

use std::io::Cursor;

use calamine::{Data, Reader};
use finback_core::rows::RawRow;

use crate::error::ImportError;

/// Extensions accepted by the upload endpoint.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "xls", "xlsx"];

enum SourceKind {
    Csv(csv::StringRecordsIntoIter<Cursor<Vec<u8>>>),
    Sheet(std::vec::IntoIter<Vec<String>>),
}

/// A one-pass row sequence over an uploaded spreadsheet.
pub struct RowSource {
    kind: SourceKind,
    /// 1-based file position of the next row to be yielded.
    next_row_number: usize,
}

impl RowSource {
    /// Open an upload and read its header row.
    ///
    /// Fails with [`ImportError::FileFormat`] on an unsupported extension,
    /// an unreadable workbook, or an empty file. Data rows are numbered
    /// from 2 (the header is row 1).
    pub fn open(file_name: &str, bytes: Vec<u8>) -> Result<(Self, Vec<String>), ImportError> {
        let kind = match file_extension(file_name) {
            Some("csv") => {
                let reader = csv::ReaderBuilder::new()
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(Cursor::new(bytes));
                SourceKind::Csv(reader.into_records())
            }
            Some("xls") | Some("xlsx") => SourceKind::Sheet(read_first_sheet(bytes)?),
            _ => {
                return Err(ImportError::FileFormat(format!(
                    "unsupported file extension on '{file_name}' (expected one of: {})",
                    SUPPORTED_EXTENSIONS.join(", ")
                )))
            }
        };

        let mut source = Self {
            kind,
            next_row_number: 1,
        };

        let header = source
            .next_row()?
            .ok_or_else(|| ImportError::FileFormat("file contains no header row".to_string()))?;

        Ok((source, header.cells))
    }

    /// Pull the next row, or `None` at end of input.
    pub fn next_row(&mut self) -> Result<Option<RawRow>, ImportError> {
        let cells = match &mut self.kind {
            SourceKind::Csv(records) => match records.next() {
                Some(Ok(record)) => Some(record.iter().map(|c| c.to_string()).collect()),
                Some(Err(e)) => {
                    return Err(ImportError::FileFormat(format!(
                        "CSV parse error at row {}: {e}",
                        self.next_row_number
                    )))
                }
                None => None,
            },
            SourceKind::Sheet(rows) => rows.next(),
        };

        Ok(cells.map(|cells| {
            let row = RawRow {
                row_number: self.next_row_number,
                cells,
            };
            self.next_row_number += 1;
            row
        }))
    }
}

/// Lowercased extension of an uploaded file name.
pub fn file_extension(file_name: &str) -> Option<&str> {
    let ext = file_name.rsplit('.').next()?;
    if ext.len() == file_name.len() {
        // No dot at all.
        return None;
    }
    SUPPORTED_EXTENSIONS
        .iter()
        .find(|s| ext.eq_ignore_ascii_case(s))
        .copied()
}

/// Read the first worksheet of an xls/xlsx workbook into text rows.
///
/// calamine materializes the sheet range; the pull-based interface above
/// still bounds everything downstream of the parse.
fn read_first_sheet(bytes: Vec<u8>) -> Result<std::vec::IntoIter<Vec<String>>, ImportError> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| ImportError::FileFormat(format!("unreadable workbook: {e}")))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ImportError::FileFormat("workbook has no worksheets".to_string()))?
        .map_err(|e| ImportError::FileFormat(format!("unreadable worksheet: {e}")))?;

    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(cell_to_text).collect())
        .collect();

    Ok(rows.into_iter())
}

/// Render a spreadsheet cell as text the way a CSV export would.
fn cell_to_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) if ndt.time() == chrono::NaiveTime::MIN => {
                ndt.date().format("%Y-%m-%d").to_string()
            }
            Some(ndt) => ndt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => String::new(),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{e:?}"),
    }
}

//! # Spreadsheet Decoding
//!
//! Buffers an XLSX workbook and yields the first sheet as header-keyed
//! rows. This is the entire spreadsheet surface the pipeline sees; the
//! processor only works with [`RawRow`]s, so tests can feed rows directly
//! through [`Sheet::from_rows`].

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Workbook could not be decoded: {0}")]
    InvalidWorkbook(String),

    #[error("Workbook has no sheets")]
    MissingSheet,

    #[error("Sheet has no data rows")]
    NoDataRows,
}

/// One data row, 1-indexed from the header (first data row is row 2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    row_number: i64,
    values: HashMap<String, String>,
}

impl RawRow {
    pub fn new(row_number: i64, values: HashMap<String, String>) -> Self {
        Self { row_number, values }
    }

    pub fn row_number(&self) -> i64 {
        self.row_number
    }

    /// Look up a cell by (case-insensitive) header name. Empty cells are
    /// absent.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(&column.to_ascii_lowercase()).map(|s| s.as_str())
    }
}

/// The decoded first sheet of a workbook.
#[derive(Debug, Clone)]
pub struct Sheet {
    rows: Vec<RawRow>,
}

impl Sheet {
    /// Build a sheet from header names and row values, for tests and any
    /// non-XLSX row source.
    pub fn from_rows<S: AsRef<str>>(headers: &[S], rows: &[Vec<Option<String>>]) -> Self {
        let rows = rows
            .iter()
            .enumerate()
            .map(|(i, cells)| {
                let mut values = HashMap::new();
                for (header, cell) in headers.iter().zip(cells.iter()) {
                    if let Some(value) = cell {
                        values.insert(header.as_ref().to_ascii_lowercase(), value.clone());
                    }
                }
                RawRow::new(i as i64 + 2, values)
            })
            .collect();

        Self { rows }
    }

    pub fn rows(&self) -> &[RawRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Decode the first sheet of an XLSX workbook.
///
/// Row 1 is the header; an absent sheet, an undecodable workbook, or a
/// sheet with zero data rows are all errors (the whole task fails with a
/// file-level error).
pub fn read_first_sheet(bytes: &[u8]) -> Result<Sheet, SpreadsheetError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec()))
        .map_err(|e| SpreadsheetError::InvalidWorkbook(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SpreadsheetError::MissingSheet)?
        .map_err(|e| SpreadsheetError::InvalidWorkbook(e.to_string()))?;

    let mut rows_iter = range.rows();
    let headers: Vec<Option<String>> = match rows_iter.next() {
        Some(header_cells) => header_cells
            .iter()
            .map(|c| normalize_cell(c).map(|h| h.to_ascii_lowercase()))
            .collect(),
        None => return Err(SpreadsheetError::NoDataRows),
    };

    let mut rows = Vec::new();
    for (i, cells) in rows_iter.enumerate() {
        let mut values = HashMap::new();
        for (header, cell) in headers.iter().zip(cells.iter()) {
            let (Some(header), Some(value)) = (header, normalize_cell(cell)) else {
                continue;
            };
            values.insert(header.clone(), value);
        }
        rows.push(RawRow::new(i as i64 + 2, values));
    }

    if rows.is_empty() {
        return Err(SpreadsheetError::NoDataRows);
    }

    Ok(Sheet { rows })
}

/// Normalize a cell to a trimmed string; empty and error cells are `None`.
///
/// Whole floats render without a fractional part (spreadsheet tools store
/// numeric-looking ids as floats), and date cells render date-only as
/// `YYYY-MM-DD`.
fn normalize_cell(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => naive.date().format("%Y-%m-%d").to_string(),
            None => return None,
        },
        Data::DateTimeIso(s) => s.split('T').next().unwrap_or(s).trim().to_string(),
        Data::DurationIso(s) => s.trim().to_string(),
    };

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strings_and_numbers() {
        assert_eq!(
            normalize_cell(&Data::String("  R-1001  ".into())),
            Some("R-1001".to_string())
        );
        assert_eq!(normalize_cell(&Data::Int(42)), Some("42".to_string()));
        assert_eq!(normalize_cell(&Data::Float(1001.0)), Some("1001".to_string()));
        assert_eq!(normalize_cell(&Data::Float(10.5)), Some("10.5".to_string()));
        assert_eq!(normalize_cell(&Data::Empty), None);
        assert_eq!(normalize_cell(&Data::String("   ".into())), None);
    }

    #[test]
    fn test_normalize_iso_datetime_keeps_date() {
        assert_eq!(
            normalize_cell(&Data::DateTimeIso("2025-07-01T14:30:00".into())),
            Some("2025-07-01".to_string())
        );
    }

    #[test]
    fn test_sheet_from_rows_numbers_from_header() {
        let sheet = Sheet::from_rows(
            &["Reservation_ID", "guest_name"],
            &[
                vec![Some("R-1".to_string()), Some("Ada".to_string())],
                vec![Some("R-2".to_string()), None],
            ],
        );

        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet.rows()[0].row_number(), 2);
        assert_eq!(sheet.rows()[1].row_number(), 3);
        // Header lookup is case-insensitive.
        assert_eq!(sheet.rows()[0].get("reservation_id"), Some("R-1"));
        assert_eq!(sheet.rows()[1].get("guest_name"), None);
    }

    #[test]
    fn test_garbage_bytes_are_invalid_workbook() {
        assert!(matches!(
            read_first_sheet(b"definitely not a zip archive"),
            Err(SpreadsheetError::InvalidWorkbook(_))
        ));
    }
}

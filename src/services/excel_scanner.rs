//! Sheet loading and header-row detection (0-based rows throughout).

use calamine::{open_workbook_auto, Reader};
use serde::Serialize;
use std::path::Path;

use crate::error::{ReconError, ReconResult};
use crate::models::expected_headers;
use crate::types::CellValue;

/// Rows inspected when looking for the header row.
pub const HEADER_SCAN_ROWS: usize = 50;
/// Expected headers a row must contain to count as the header row.
pub const MIN_HEADER_MATCHES: usize = 3;
/// Header row assumed when none is found (the export's usual title block height).
pub const DEFAULT_HEADER_ROW: usize = 35;

/// The first worksheet of a file, with rows and columns at their absolute
/// positions (row 0 is spreadsheet row 1, column 0 is column A).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetGrid {
    pub rows: Vec<Vec<CellValue>>,
}

impl SheetGrid {
    pub fn new(rows: Vec<Vec<CellValue>>) -> Self {
        Self { rows }
    }

    pub fn row(&self, index: usize) -> &[CellValue] {
        self.rows.get(index).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMatch {
    pub row: usize,
    pub matches: usize,
    /// False when the default row was used because no row qualified.
    pub detected: bool,
}

/// Read the first worksheet. calamine ranges start at the first used cell, so
/// leading empty rows and columns are padded back in.
pub fn read_first_sheet(path: &Path) -> ReconResult<SheetGrid> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| ReconError::Workbook(format!("{}: {}", path.display(), e)))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ReconError::EmptyWorkbook(path.to_path_buf()))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ReconError::Workbook(format!("sheet '{}': {}", sheet_name, e)))?;

    let (row_offset, col_offset) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));
    let mut rows = vec![Vec::new(); row_offset];
    for row in range.rows() {
        let mut cells = vec![CellValue::Empty; col_offset];
        cells.extend(row.iter().map(CellValue::from_data));
        rows.push(cells);
    }
    tracing::debug!(
        sheet = %sheet_name,
        rows = rows.len(),
        "loaded worksheet"
    );
    Ok(SheetGrid::new(rows))
}

/// Number of expected headers contained (as substrings) in any cell of the row.
pub fn count_header_matches(row: &[CellValue]) -> usize {
    let texts: Vec<String> = row.iter().map(CellValue::display).collect();
    expected_headers()
        .iter()
        .filter(|header| texts.iter().any(|t| t.contains(*header)))
        .count()
}

/// Scan the leading rows for the first one with enough expected headers.
pub fn detect_header_row(grid: &SheetGrid) -> HeaderMatch {
    for index in 0..HEADER_SCAN_ROWS.min(grid.rows.len()) {
        let matches = count_header_matches(grid.row(index));
        if matches >= MIN_HEADER_MATCHES {
            return HeaderMatch {
                row: index,
                matches,
                detected: true,
            };
        }
    }
    HeaderMatch {
        row: DEFAULT_HEADER_ROW,
        matches: 0,
        detected: false,
    }
}

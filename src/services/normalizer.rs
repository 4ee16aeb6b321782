//! Projects a raw sheet onto the statement columns.

use chrono::{Duration, NaiveDate};
use regex::Regex;
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::OnceLock;

use crate::models::{Column, ColumnMap, NON_RETURN_MARKERS, RETURN_MARKER};
use crate::services::excel_scanner::SheetGrid;
use crate::types::{CellValue, NormalizedRow};

/// Reserved columns (N..Q) that follow the core schema in the export layout.
/// They are dropped by position before any header lookup.
pub const RESERVED_COLUMNS: Range<usize> = 13..17;

#[derive(Debug, Clone, Default)]
pub struct NormalizedSheet {
    pub columns: ColumnMap,
    pub rows: Vec<NormalizedRow>,
    /// Distinct return-marker values that were neither the return marker nor blank.
    pub unexpected_return_markers: Vec<String>,
}

impl NormalizedSheet {
    pub fn missing_columns(&self) -> Vec<Column> {
        self.columns.missing_schema_columns()
    }

    /// Earliest `YYYY-MM` across all rows.
    pub fn earliest_year_month(&self) -> Option<String> {
        self.rows
            .iter()
            .filter_map(NormalizedRow::delivery_date)
            .min()
            .and_then(|d| d.get(..7))
            .map(str::to_string)
    }
}

/// Map header labels to source positions. Canonical labels take precedence
/// over aliases; the first occurrence of a label wins.
pub fn resolve_columns(header: &[CellValue]) -> ColumnMap {
    let labels: Vec<(usize, String)> = header
        .iter()
        .enumerate()
        .filter(|(pos, _)| !RESERVED_COLUMNS.contains(pos))
        .map(|(pos, cell)| (pos, cell.display().trim().to_string()))
        .collect();

    let mut map = ColumnMap::default();
    for column in Column::ALL {
        let found = labels
            .iter()
            .find(|(_, label)| label == column.label())
            .or_else(|| {
                labels
                    .iter()
                    .find(|(_, label)| column.aliases().contains(&label.as_str()))
            });
        if let Some((pos, _)) = found {
            map.set(column, *pos);
        }
    }
    map
}

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4})\s*[-/.年]\s*(\d{1,2})\s*[-/.月]\s*(\d{1,2})")
            .expect("date pattern is valid")
    })
}

fn compact_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d{4})(\d{2})(\d{2})$").expect("date pattern is valid"))
}

fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(1.0..2_958_466.0).contains(&serial) {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(Duration::days(serial.trunc() as i64))
}

/// Coerce a delivery-date cell to a calendar date. Anything unparseable is `None`.
pub fn parse_delivery_date(cell: &CellValue) -> Option<NaiveDate> {
    match cell {
        CellValue::DateTime(dt) => Some(dt.date()),
        CellValue::Number(n) => excel_serial_to_date(*n),
        CellValue::Text(s) => {
            let s = s.trim();
            let caps = date_pattern()
                .captures(s)
                .or_else(|| compact_date_pattern().captures(s))?;
            let year = caps[1].parse().ok()?;
            let month = caps[2].parse().ok()?;
            let day = caps[3].parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        }
        CellValue::Empty | CellValue::Bool(_) => None,
    }
}

enum ReturnMarker {
    Returned,
    NotReturned,
    Unexpected(String),
}

fn classify_return_marker(cell: &CellValue) -> ReturnMarker {
    if cell.is_blank() {
        return ReturnMarker::NotReturned;
    }
    let text = cell.display();
    let text = text.trim();
    if text == RETURN_MARKER {
        ReturnMarker::Returned
    } else if NON_RETURN_MARKERS.contains(&text) {
        ReturnMarker::NotReturned
    } else {
        ReturnMarker::Unexpected(text.to_string())
    }
}

/// Re-read the grid from the header row and keep only known columns.
/// Delivery dates become `YYYY-MM-DD` text (or empty); fully blank rows are dropped.
pub fn normalize_sheet(grid: &SheetGrid, header_row: usize) -> NormalizedSheet {
    let columns = resolve_columns(grid.row(header_row));
    let mut unexpected = BTreeSet::new();
    let mut rows = Vec::new();

    for raw in grid.rows.iter().skip(header_row + 1) {
        let mut row = NormalizedRow::default();
        for column in columns.present() {
            let Some(pos) = columns.position(column) else {
                continue;
            };
            let cell = raw.get(pos).cloned().unwrap_or_default();
            let value = if column == Column::DeliveryDate {
                parse_delivery_date(&cell)
                    .map(|d| CellValue::Text(d.format("%Y-%m-%d").to_string()))
                    .unwrap_or_default()
            } else {
                cell
            };
            row.set(column, value);
        }
        if columns.present().all(|c| row.get(c).is_blank()) {
            continue;
        }
        row.is_return = match classify_return_marker(row.get(Column::ReturnFlag)) {
            ReturnMarker::Returned => true,
            ReturnMarker::NotReturned => false,
            ReturnMarker::Unexpected(value) => {
                unexpected.insert(value);
                false
            }
        };
        rows.push(row);
    }

    NormalizedSheet {
        columns,
        rows,
        unexpected_return_markers: unexpected.into_iter().collect(),
    }
}

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::{Column, COLUMN_COUNT};

/// A single spreadsheet cell as read from a supplier export.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    Text(String),
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    pub fn from_data(cell: &calamine::Data) -> Self {
        use calamine::{Data, DataType};
        match cell {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Bool(*b),
            other => other
                .as_datetime()
                .map(CellValue::DateTime)
                .unwrap_or_else(|| CellValue::Text(other.to_string())),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric view: numbers as-is, text when it parses after dropping
    /// thousands separators.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) if n.is_finite() => Some(*n),
            CellValue::Text(s) => {
                let cleaned = s.trim().replace(',', "");
                cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
            }
            _ => None,
        }
    }

    /// Text as it would be shown in a cell. Whole numbers print without a
    /// fractional part.
    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            CellValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::DateTime(dt) => {
                if dt.num_seconds_from_midnight() == 0 {
                    dt.format("%Y-%m-%d").to_string()
                } else {
                    dt.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
            CellValue::Text(s) => s.clone(),
        }
    }
}

/// A supplier export row projected onto the known columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRow {
    cells: Vec<CellValue>,
    pub is_return: bool,
}

impl Default for NormalizedRow {
    fn default() -> Self {
        Self {
            cells: vec![CellValue::Empty; COLUMN_COUNT],
            is_return: false,
        }
    }
}

impl NormalizedRow {
    pub fn get(&self, column: Column) -> &CellValue {
        &self.cells[column.index()]
    }

    pub fn set(&mut self, column: Column, value: CellValue) {
        self.cells[column.index()] = value;
    }

    /// Delivery date as `YYYY-MM-DD`, if the row has one.
    pub fn delivery_date(&self) -> Option<&str> {
        match self.get(Column::DeliveryDate) {
            CellValue::Text(s) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    /// `YYYY-MM` of the delivery date.
    pub fn year_month(&self) -> Option<&str> {
        self.delivery_date().and_then(|d| d.get(..7))
    }
}

/// Progress and diagnostics for the presentation layer, in the order they happen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProcessEvent {
    FileStarted {
        file: String,
        index: usize,
        total: usize,
    },
    Info {
        message: String,
    },
    Warning {
        message: String,
    },
    WorkbookWritten {
        path: PathBuf,
    },
    FileArchived {
        file: String,
        archived_to: PathBuf,
    },
    FileFailed {
        file: String,
        message: String,
    },
    Progress {
        processed: usize,
        total: usize,
        percent: u8,
    },
    Finished {
        summary: RunSummary,
    },
}

/// Receives [`ProcessEvent`]s while a batch runs.
pub trait EventSink {
    fn emit(&mut self, event: ProcessEvent);
}

impl<F: FnMut(ProcessEvent)> EventSink for F {
    fn emit(&mut self, event: ProcessEvent) {
        self(event)
    }
}

/// Sink that keeps every event in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventLog(pub Vec<ProcessEvent>);

impl EventLog {
    pub fn events(&self) -> &[ProcessEvent] {
        &self.0
    }

    /// Messages of every `Info` and `Warning` event, in order.
    pub fn messages(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter_map(|e| match e {
                ProcessEvent::Info { message } | ProcessEvent::Warning { message } => {
                    Some(message.as_str())
                }
                _ => None,
            })
            .collect()
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: ProcessEvent) {
        self.0.push(event);
    }
}

/// End-of-run report. `warnings` keeps every warning in emission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total_files: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub workbooks: Vec<PathBuf>,
    pub archived: Vec<PathBuf>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

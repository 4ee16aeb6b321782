//! Supplier delivery reconciliation: reads delivery-detail exports, groups
//! lines by supplier account and tax rate, and writes one statement workbook
//! per group under `export/{YYYY-MM}/`.

pub mod commands;
pub mod config;
pub mod error;
pub mod excel;
pub mod logging;
pub mod models;
pub mod services;
pub mod types;

pub use commands::{process_files, RunOptions};
pub use config::TitleBlock;
pub use error::{ReconError, ReconResult};
pub use types::{CellValue, EventLog, EventSink, ProcessEvent, RunSummary};

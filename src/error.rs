use std::path::PathBuf;
use thiserror::Error;

pub type ReconResult<T> = Result<T, ReconError>;

/// Failures that abort a single input file (or the whole run when they happen
/// before the first file). Everything recoverable is reported as a warning event.
#[derive(Debug, Error)]
pub enum ReconError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not read Excel file: {0}")]
    Workbook(String),
    #[error("workbook has no worksheets: {}", .0.display())]
    EmptyWorkbook(PathBuf),
    #[error("could not write Excel file: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("invalid path: {}", .0.display())]
    InvalidPath(PathBuf),
}

impl ReconError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

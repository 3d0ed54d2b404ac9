use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ReportError>;

/// Error type covering the different failure cases that can occur while the
/// engine loads, merges, persists, or exports payroll data.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when a lookup source has an extension the cache cannot read.
    #[error("unsupported lookup file format: '{0}'")]
    UnsupportedFormat(String),

    /// Raised when a structured lookup source does not follow the expected
    /// two-column layout.
    #[error("lookup schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Raised when the fast-reload lookup artifact cannot be decoded.
    #[error("corrupt lookup cache at {path}: {reason}")]
    CorruptCache { path: PathBuf, reason: String },

    /// Raised when a required data sheet is absent from the source workbook.
    #[error("required sheet '{0}' not found")]
    MissingSheet(String),

    /// Raised when a header cell does not match the expected schema. The
    /// column index is 1-based, matching what users see in Excel.
    #[error(
        "{sheet} header mismatch at column {column}: expected '{expected}', found '{actual}'"
    )]
    HeaderMismatch {
        sheet: String,
        column: usize,
        expected: String,
        actual: String,
    },

    /// Raised when the save target is held open by another process. The
    /// merge result is otherwise intact and cleanup still runs.
    #[error("output workbook {0} is locked by another process")]
    OutputLocked(PathBuf),

    /// Raised for save failures other than a locked target.
    #[error("failed to persist output workbook {path}: {source}")]
    Persistence {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Raised when a single technician tab fails to export. The driver
    /// records this per tab and keeps going.
    #[error("failed to export sheet '{sheet}': {reason}")]
    ExportFailure { sheet: String, reason: String },

    /// Raised when the page-rendering engine cannot be reached at all.
    #[error("rendering engine unavailable: {0}")]
    GatewayUnavailable(String),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

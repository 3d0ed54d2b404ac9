//! Per-technician PDF export, driven through a pluggable rendering
//! gateway.
//!
//! The rendering engine (a native spreadsheet application) is an external
//! collaborator: this module owns only the contract, which covers the
//! tabs to export, the fixed page setup, artifact naming, and failure
//! isolation.
//! The engine handle is stateful and must be driven by exactly one export
//! operation at a time, so the driver takes it behind a [`Mutex`] and
//! holds the lock for the whole operation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{ReportError, Result};
use crate::events::RunLog;
use crate::io::excel_read::{ADJUSTMENTS_SHEET, INVOICES_SHEET};
use crate::report::{MASTER_SHEET, TechnicianSheet};

/// Sheets that never export: the two raw input sheets and the master.
const NON_TECHNICIAN_SHEETS: [&str; 3] = [INVOICES_SHEET, ADJUSTMENTS_SHEET, MASTER_SHEET];

/// Page layout for every exported tab: scaled to one page wide, with
/// unconstrained height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSetup {
    pub fit_pages_wide: u16,
    /// `None` leaves the page count in the long direction unlimited.
    pub fit_pages_tall: Option<u16>,
}

pub const SINGLE_PAGE_WIDE: PageSetup = PageSetup {
    fit_pages_wide: 1,
    fit_pages_tall: None,
};

/// Contract to the native rendering engine.
pub trait PageRenderer {
    /// Opens the workbook in the engine. Failure here aborts the whole
    /// export operation.
    fn begin(&mut self, document: &Path) -> Result<()>;

    /// Renders one sheet to `target` with the given page setup.
    fn render_sheet(&mut self, sheet: &str, setup: &PageSetup, target: &Path) -> Result<()>;

    /// Releases whatever `begin` acquired. Always called after a
    /// successful `begin`, whatever the per-sheet outcomes.
    fn finish(&mut self);
}

/// Outcome of one export operation.
#[derive(Debug, Default)]
pub struct ExportSummary {
    pub exported: Vec<PathBuf>,
    pub failed: Vec<String>,
}

/// Exports one PDF per technician sheet into `<output_dir>/PDFs`.
///
/// A sheet that fails to render is recorded and skipped; the remaining
/// sheets still export. An engine that cannot be reached at all aborts
/// with [`ReportError::GatewayUnavailable`].
pub fn export_technician_pdfs<R: PageRenderer>(
    engine: &Mutex<R>,
    document: &Path,
    sheets: &[TechnicianSheet],
    output_dir: &Path,
    print_date: &str,
    log: &mut RunLog,
) -> Result<ExportSummary> {
    log.info("Extracting PDF files...");

    let mut engine = engine.lock().map_err(|_| {
        ReportError::GatewayUnavailable("rendering engine lock is poisoned".to_string())
    })?;

    let pdf_dir = output_dir.join("PDFs");
    fs::create_dir_all(&pdf_dir)?;

    engine
        .begin(document)
        .map_err(|error| ReportError::GatewayUnavailable(error.to_string()))?;

    let mut summary = ExportSummary::default();
    for sheet in sheets {
        if NON_TECHNICIAN_SHEETS.contains(&sheet.sheet.as_str()) {
            continue;
        }

        let target = pdf_dir.join(pdf_file_name(&sheet.technician, print_date));
        log.info(format!("Extracting {}...", sheet.sheet));
        match engine.render_sheet(&sheet.sheet, &SINGLE_PAGE_WIDE, &target) {
            Ok(()) => summary.exported.push(target),
            Err(error) => {
                let failure = ReportError::ExportFailure {
                    sheet: sheet.sheet.clone(),
                    reason: error.to_string(),
                };
                log.error(failure.to_string());
                summary.failed.push(sheet.sheet.clone());
            }
        }
    }

    engine.finish();
    Ok(summary)
}

/// `<last name>, <first name> - <print date>.pdf`; the technician's first
/// name is everything before the first space.
pub fn pdf_file_name(technician: &str, print_date: &str) -> String {
    match technician.split_once(' ') {
        Some((first, last)) => format!("{last}, {first} - {print_date}.pdf"),
        None => format!("{technician} - {print_date}.pdf"),
    }
}

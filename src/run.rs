//! Run orchestration: one sequential pass from source workbook to saved
//! report.
//!
//! The engine is deliberately single-threaded: grouping depends on
//! insertion order, the ledger on date order, and the master sheet on row
//! cursors synchronized with each detail sheet, so the whole merge runs
//! as one synchronous call. Callers own any threading around it.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::instrument;

use crate::error::Result;
use crate::events::RunLog;
use crate::group;
use crate::io::excel_read;
use crate::lookup::LookupCache;
use crate::report::{self, OUTPUT_SUFFIX, TechnicianSheet};

/// Inputs for one merge run.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub workbook: PathBuf,
    pub lookup: PathBuf,
    pub output_dir: PathBuf,
}

/// Primary result of a merge run. The ordered event log travels
/// separately, in the [`RunLog`] the caller supplied.
#[derive(Debug)]
pub struct MergeReport {
    pub output_path: PathBuf,
    pub sheets: Vec<TechnicianSheet>,
}

/// Parses the payroll workbook, resolves customer names, composes the
/// combined report, and persists it under the output directory.
#[instrument(
    level = "info",
    skip_all,
    fields(workbook = %request.workbook.display(), lookup = %request.lookup.display())
)]
pub fn merge_workbook(request: &MergeRequest, log: &mut RunLog) -> Result<MergeReport> {
    let mut cache = LookupCache::load(&request.lookup, &request.output_dir, log)?;
    let sets = excel_read::parse_workbook(&request.workbook, log)?;
    let technicians = group::eligible_technicians(&sets);
    let mut composed = report::compose(&sets, &technicians, &cache, log)?;

    fs::create_dir_all(&request.output_dir)?;
    let output_path = output_path_for(&request.workbook, &request.output_dir);
    log.info(format!(
        "Saving combined workbook to {}",
        output_path.display()
    ));
    let saved = composed.save(&output_path);
    match &saved {
        Ok(()) => log.info("Workbook saved..."),
        Err(error) => log.error(format!("Error saving workbook: {error}")),
    }

    // The lookup artifact is ephemeral; remove it whether or not the save
    // went through.
    cache.release(log);
    saved?;

    Ok(MergeReport {
        output_path,
        sheets: composed.technician_sheets().to_vec(),
    })
}

/// `<input stem>-Combined.xlsx` under the output directory.
fn output_path_for(workbook: &Path, output_dir: &Path) -> PathBuf {
    let stem = workbook
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Payroll".to_string());
    output_dir.join(format!("{stem}{OUTPUT_SUFFIX}.xlsx"))
}

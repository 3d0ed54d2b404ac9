//! Invoice-id → customer-name lookup cache.
//!
//! The lookup source arrives either as the business system's two-column
//! Excel export or as the JSON fast-reload artifact this module writes on
//! first use. Excel sources are parsed once, persisted as JSON next to the
//! report output, and every subsequent load in the run reads the artifact.
//! The artifact is ephemeral: it is removed when the run releases the
//! cache, and a `Drop` backstop covers early exits.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use calamine::{Reader, Xlsx, open_workbook};

use crate::error::{ReportError, Result};
use crate::events::RunLog;
use crate::io::excel_read::{cell_to_i64, cell_to_string};

/// Sheet name the business system uses for lookup exports.
const LOOKUP_SHEET: &str = "Sheet1";
/// File name of the fast-reload artifact, written under the output
/// directory.
const ARTIFACT_NAME: &str = "LookupTable.json";

/// Mapping from invoice identifier to customer name.
pub type LookupTable = BTreeMap<i64, String>;

/// Process-scoped lookup cache, loaded once per run.
#[derive(Debug)]
pub struct LookupCache {
    table: LookupTable,
    artifact: Option<PathBuf>,
}

impl LookupCache {
    /// Loads the lookup table from `source`.
    ///
    /// An `.xlsx` source is parsed, converted to the JSON artifact under
    /// `output_dir`, and re-read from the artifact so later loads hit the
    /// fast path. A `.json` source is read directly and treated as the
    /// artifact itself. Any other extension is rejected.
    pub fn load(source: &Path, output_dir: &Path, log: &mut RunLog) -> Result<Self> {
        log.info("Loading lookup table...");

        let extension = source
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "xlsx" => {
                log.info("Excel lookup file detected.");
                let table = parse_lookup_workbook(source, log)?;
                let artifact = write_artifact(&table, output_dir, log)?;
                // Read-after-write: the artifact is the source of truth
                // from here on.
                let table = load_artifact(&artifact)?;
                Ok(Self {
                    table,
                    artifact: Some(artifact),
                })
            }
            "json" => {
                log.info("JSON lookup file detected.");
                let table = load_artifact(source)?;
                Ok(Self {
                    table,
                    artifact: Some(source.to_path_buf()),
                })
            }
            other => Err(ReportError::UnsupportedFormat(format!(".{other}"))),
        }
    }

    /// Wraps an already-built table. No artifact is attached, so release
    /// is a no-op.
    pub fn from_table(table: LookupTable) -> Self {
        Self {
            table,
            artifact: None,
        }
    }

    /// Resolves an invoice number to a customer name. Blank names in the
    /// source are treated as missing.
    pub fn resolve(&self, invoice: i64) -> Option<&str> {
        self.table
            .get(&invoice)
            .map(String::as_str)
            .filter(|name| !name.trim().is_empty())
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Path of the JSON artifact currently in effect.
    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact.as_deref()
    }

    /// Deletes the ephemeral artifact. Best-effort: a failed removal is
    /// logged and the run result is unaffected.
    pub fn release(&mut self, log: &mut RunLog) {
        if let Some(path) = self.artifact.take() {
            log.debug(format!(
                "Removing temporary lookup file at {}...",
                path.display()
            ));
            if let Err(error) = fs::remove_file(&path) {
                log.warning(format!("Failed to remove temporary lookup file: {error}"));
            }
        }
    }
}

impl Drop for LookupCache {
    fn drop(&mut self) {
        // Backstop for exit paths that never reach the explicit release,
        // e.g. a composer failure unwinding the run.
        if let Some(path) = self.artifact.take() {
            if let Err(error) = fs::remove_file(&path) {
                tracing::debug!(
                    "lookup artifact {} not removed on drop: {error}",
                    path.display()
                );
            }
        }
    }
}

fn parse_lookup_workbook(source: &Path, log: &mut RunLog) -> Result<LookupTable> {
    let mut workbook: Xlsx<_> = open_workbook(source)?;
    let range = workbook
        .worksheet_range(LOOKUP_SHEET)
        .ok_or_else(|| {
            ReportError::SchemaMismatch(format!("lookup workbook missing sheet '{LOOKUP_SHEET}'"))
        })?
        .map_err(ReportError::from)?;

    if range.height() > 0 && range.width() < 2 {
        return Err(ReportError::SchemaMismatch(format!(
            "expected two columns (invoice id, customer name) in '{LOOKUP_SHEET}', found {}",
            range.width()
        )));
    }

    let mut table = LookupTable::new();
    // First row is the header.
    for (index, row) in range.rows().enumerate().skip(1) {
        let Some(invoice_id) = cell_to_i64(row.first()) else {
            log.warning(format!(
                "Failed to parse lookup worksheet row {}: no integer invoice id",
                index + 1
            ));
            continue;
        };
        let customer_name = cell_to_string(row.get(1));
        table.insert(invoice_id, customer_name);
    }

    log.info(format!(
        "Found {} invoices in lookup master workbook.",
        table.len()
    ));
    Ok(table)
}

fn write_artifact(table: &LookupTable, output_dir: &Path, log: &mut RunLog) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(ARTIFACT_NAME);
    let json = serde_json::to_string(table)?;
    fs::write(&path, json)?;
    log.debug(format!("Lookup cache written to {}", path.display()));
    Ok(path)
}

fn load_artifact(path: &Path) -> Result<LookupTable> {
    let data = fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(|error| ReportError::CorruptCache {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })
}

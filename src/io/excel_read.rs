//! Record parser for the payroll workbook.
//!
//! Validates the fixed schemas of the `Invoices` and `Direct Payroll
//! Adjustments` sheets, strips the known-junk trailing column and notes
//! the non-reportable auxiliary sheets, then decodes each row into a typed
//! record. Decoding is strict: a row that does not fit the validated
//! schema is rejected with a logged warning instead of being assembled
//! into a loosely-typed bag.

use std::path::Path;

use calamine::{DataType, Range, Reader, Xlsx, open_workbook};
use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::{ReportError, Result};
use crate::events::RunLog;
use crate::model::{AdjustmentRecord, BusinessUnit, InvoiceRecord, RecordSets, SplitType};

/// Sheet holding billed-service invoice lines.
pub const INVOICES_SHEET: &str = "Invoices";
/// Sheet holding direct payroll adjustments.
pub const ADJUSTMENTS_SHEET: &str = "Direct Payroll Adjustments";
/// Auxiliary sheets the business system exports that never reach the
/// report output.
pub const JUNK_SHEETS: [&str; 2] = ["Commission Base Payroll Adj", "Non-job Purchase Orders"];

/// Expected `Invoices` header, in exact column order. The export carries
/// one extra always-blank metadata column past these.
pub const INVOICE_HEADERS: [&str; 15] = [
    "Technician",
    "Invoice Id",
    "Invoice",
    "Invoiced On",
    "Customer",
    "Total",
    "Split %",
    "Subtotal",
    "Cost",
    "Bonus",
    "Pay Adj.",
    "NC Total",
    "Net Serv. Vol.",
    "GP",
    "Business Unit",
];

/// Expected `Direct Payroll Adjustments` header, same convention.
pub const ADJUSTMENT_HEADERS: [&str; 6] = [
    "Technician",
    "Invoice Id",
    "Invoice",
    "Posted On",
    "Memo",
    "Amount",
];

/// Parses the source workbook into technician-partitioned record sets.
pub fn parse_workbook(path: &Path, log: &mut RunLog) -> Result<RecordSets> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    log.info("Preparing workbook data...");

    for junk in JUNK_SHEETS {
        if workbook.sheet_names().iter().any(|name| name == junk) {
            log.info(format!(
                "Unnecessary sheet detected -- '{junk}' will not be carried into the output."
            ));
        }
    }

    let invoices_range = read_required_sheet(&mut workbook, INVOICES_SHEET)?;
    let adjustments_range = read_required_sheet(&mut workbook, ADJUSTMENTS_SHEET)?;

    let mut sets = RecordSets::new();

    if validate_header_row(&invoices_range, &INVOICE_HEADERS, INVOICES_SHEET)? {
        note_junk_column(&invoices_range, INVOICE_HEADERS.len(), INVOICES_SHEET, log);
        for (index, row) in invoices_range.rows().enumerate().skip(1) {
            let excel_row = index + 1;
            if let Some(record) = decode_invoice_row(excel_row, row, log) {
                sets.push_invoice(record);
            }
        }
        log.info(format!(
            "Invoices populated: {} rows decoded.",
            sets.invoice_count()
        ));
    }

    if validate_header_row(&adjustments_range, &ADJUSTMENT_HEADERS, ADJUSTMENTS_SHEET)? {
        note_junk_column(
            &adjustments_range,
            ADJUSTMENT_HEADERS.len(),
            ADJUSTMENTS_SHEET,
            log,
        );
        for (index, row) in adjustments_range.rows().enumerate().skip(1) {
            let excel_row = index + 1;
            if let Some(record) = decode_adjustment_row(excel_row, row, log) {
                sets.push_adjustment(record);
            }
        }
    }

    log.info(format!(
        "Direct payroll adjustments populated: {} rows decoded, {} total technicians found in all.",
        sets.adjustment_count(),
        sets.technicians().count()
    ));
    Ok(sets)
}

fn read_required_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    name: &str,
) -> Result<Range<DataType>> {
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| ReportError::MissingSheet(name.to_string()))?;
    let range = range_result.map_err(ReportError::from)?;
    Ok(range)
}

/// Compares the first `expected.len()` header cells against the schema in
/// exact column order. Returns `Ok(false)` for a sheet with no header row
/// at all, which decodes to an empty record set.
fn validate_header_row(range: &Range<DataType>, expected: &[&str], sheet: &str) -> Result<bool> {
    let Some(header) = range.rows().next() else {
        return Ok(false);
    };

    for (index, expected_text) in expected.iter().enumerate() {
        let actual = cell_to_string(header.get(index));
        if normalize_header(&actual) != normalize_header(expected_text) {
            return Err(ReportError::HeaderMismatch {
                sheet: sheet.to_string(),
                column: index + 1,
                expected: expected_text.to_string(),
                actual,
            });
        }
    }

    Ok(true)
}

/// Normalizes header text for comparison: case, internal whitespace, and
/// the punctuation the export is inconsistent about (`.` and `%`).
fn normalize_header(text: &str) -> String {
    let stripped: String = text.chars().filter(|ch| !matches!(ch, '.' | '%')).collect();
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn note_junk_column(range: &Range<DataType>, schema_width: usize, sheet: &str, log: &mut RunLog) {
    if range.width() > schema_width {
        log.info(format!(
            "Unnecessary metadata detected -- dropping trailing column from '{sheet}'."
        ));
    }
}

fn decode_invoice_row(
    excel_row: usize,
    row: &[DataType],
    log: &mut RunLog,
) -> Option<InvoiceRecord> {
    if row.iter().all(cell_is_blank) {
        return None;
    }
    if row.len() < INVOICE_HEADERS.len() {
        log.warning(format!(
            "{INVOICES_SHEET} row {excel_row}: expected {} fields, found {} -- row rejected",
            INVOICE_HEADERS.len(),
            row.len()
        ));
        return None;
    }

    let technician = non_blank(cell_to_string(row.first()));
    let Some(invoiced_on) = cell_to_datetime(row.get(3)) else {
        // The export ends with an aggregate totals row carrying neither a
        // technician nor a date.
        if technician.is_none() {
            log.debug(format!(
                "{INVOICES_SHEET} row {excel_row}: skipping source aggregate row"
            ));
        } else {
            log.warning(format!(
                "{INVOICES_SHEET} row {excel_row}: unreadable invoice date -- row rejected"
            ));
        }
        return None;
    };

    let Some(invoice_id) = cell_to_i64(row.get(1)) else {
        log.warning(format!(
            "{INVOICES_SHEET} row {excel_row}: unreadable invoice id -- row rejected"
        ));
        return None;
    };
    let Some(invoice) = cell_to_i64(row.get(2)) else {
        log.warning(format!(
            "{INVOICES_SHEET} row {excel_row}: unreadable invoice number -- row rejected"
        ));
        return None;
    };

    let split_raw = cell_to_string(row.get(6));
    let Some(split) = SplitType::parse(&split_raw) else {
        log.warning(format!(
            "{INVOICES_SHEET} row {excel_row}: unrecognized split code '{split_raw}' -- row rejected"
        ));
        return None;
    };

    let unit_raw = cell_to_string(row.get(14));
    let Some(business_unit) = BusinessUnit::new(unit_raw) else {
        log.warning(format!(
            "{INVOICES_SHEET} row {excel_row}: missing business unit -- row rejected"
        ));
        return None;
    };

    Some(InvoiceRecord {
        technician,
        invoice_id,
        invoice,
        invoiced_on,
        customer: non_blank(cell_to_string(row.get(4))),
        total: cell_to_f64(row.get(5)).unwrap_or(0.0),
        split,
        subtotal: cell_to_f64(row.get(7)).unwrap_or(0.0),
        cost: cell_to_f64(row.get(8)).unwrap_or(0.0),
        bonus: cell_to_f64(row.get(9)).unwrap_or(0.0),
        pay_adj: cell_to_f64(row.get(10)).unwrap_or(0.0),
        nc_total: cell_to_f64(row.get(11)).unwrap_or(0.0),
        net_serv_vol: cell_to_string(row.get(12)),
        gp: cell_to_f64(row.get(13)).unwrap_or(0.0),
        business_unit,
    })
}

fn decode_adjustment_row(
    excel_row: usize,
    row: &[DataType],
    log: &mut RunLog,
) -> Option<AdjustmentRecord> {
    if row.iter().all(cell_is_blank) {
        return None;
    }
    if row.len() < ADJUSTMENT_HEADERS.len() {
        log.warning(format!(
            "{ADJUSTMENTS_SHEET} row {excel_row}: expected {} fields, found {} -- row rejected",
            ADJUSTMENT_HEADERS.len(),
            row.len()
        ));
        return None;
    }

    let technician = non_blank(cell_to_string(row.first()));
    let Some(posted_on) = cell_to_datetime(row.get(3)) else {
        if technician.is_none() {
            log.debug(format!(
                "{ADJUSTMENTS_SHEET} row {excel_row}: skipping source aggregate row"
            ));
        } else {
            log.warning(format!(
                "{ADJUSTMENTS_SHEET} row {excel_row}: unreadable posted date -- row rejected"
            ));
        }
        return None;
    };

    let Some(invoice_id) = cell_to_i64(row.get(1)) else {
        log.warning(format!(
            "{ADJUSTMENTS_SHEET} row {excel_row}: unreadable invoice id -- row rejected"
        ));
        return None;
    };
    let Some(invoice) = cell_to_i64(row.get(2)) else {
        log.warning(format!(
            "{ADJUSTMENTS_SHEET} row {excel_row}: unreadable invoice number -- row rejected"
        ));
        return None;
    };

    Some(AdjustmentRecord {
        technician,
        invoice_id,
        invoice,
        posted_on,
        memo: cell_to_string(row.get(4)),
        amount: cell_to_f64(row.get(5)).unwrap_or(0.0),
    })
}

pub(crate) fn cell_to_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(DataType::String(value)) => value.clone(),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Bool(value)) => value.to_string(),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

pub(crate) fn cell_to_i64(cell: Option<&DataType>) -> Option<i64> {
    match cell {
        Some(DataType::Int(value)) => Some(*value),
        Some(DataType::Float(value)) if value.fract() == 0.0 => Some(*value as i64),
        Some(DataType::String(value)) => value.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn cell_to_f64(cell: Option<&DataType>) -> Option<f64> {
    match cell {
        Some(DataType::Float(value)) => Some(*value),
        Some(DataType::Int(value)) => Some(*value as f64),
        Some(DataType::String(value)) => {
            let cleaned = value.trim().replace(['$', ','], "");
            cleaned.parse().ok()
        }
        _ => None,
    }
}

/// Decodes a date cell. Native datetime cells arrive as Excel serial
/// numbers; text fallbacks cover re-saved workbooks.
pub(crate) fn cell_to_datetime(cell: Option<&DataType>) -> Option<NaiveDateTime> {
    match cell {
        Some(DataType::DateTime(serial)) => serial_to_datetime(*serial),
        Some(DataType::Float(serial)) => serial_to_datetime(*serial),
        Some(DataType::Int(serial)) => serial_to_datetime(*serial as f64),
        Some(DataType::String(text)) => parse_datetime_text(text.trim()),
        _ => None,
    }
}

/// Excel serial dates count days from 1899-12-30.
fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial <= 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    epoch.checked_add_signed(Duration::seconds(seconds))
}

fn parse_datetime_text(text: &str) -> Option<NaiveDateTime> {
    for format in ["%m/%d/%Y %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(value) = NaiveDateTime::parse_from_str(text, format) {
            return Some(value);
        }
    }
    for format in ["%m/%d/%Y", "%Y-%m-%d"] {
        if let Ok(value) = NaiveDate::parse_from_str(text, format) {
            return value.and_hms_opt(0, 0, 0);
        }
    }
    None
}

fn cell_is_blank(cell: &DataType) -> bool {
    match cell {
        DataType::Empty => true,
        DataType::String(value) => value.trim().is_empty(),
        _ => false,
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

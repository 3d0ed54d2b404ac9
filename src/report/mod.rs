//! Report composer.
//!
//! Builds the consolidated output workbook: the two raw input sheets
//! re-emitted from the decoded records, the `All Technicians` master sheet
//! at the third position, and one detail sheet per eligible technician.
//! Master rows mirror the five leading detail fields as live formula
//! references so edits to a detail sheet flow through, and so the
//! missing-customer highlight keyed on blank cells still fires on
//! computed references.

pub mod ledger;
pub mod widths;

use std::path::Path;

use rust_xlsxwriter::{ConditionalFormatFormula, Workbook, Worksheet};

use crate::error::Result;
use crate::events::RunLog;
use crate::io::excel_read::{
    ADJUSTMENT_HEADERS, ADJUSTMENTS_SHEET, INVOICE_HEADERS, INVOICES_SHEET,
};
use crate::io::excel_write::{
    self, MISSING_CUSTOMER_RULE, ReportFormats, SheetNameRegistry, cell_ref, sheet_cell_ref,
};
use crate::lookup::LookupCache;
use crate::model::RecordSets;
use crate::report::ledger::LedgerEntry;
use crate::report::widths::{AutoFit, DisplayValue};

/// Name of the consolidated cross-technician sheet.
pub const MASTER_SHEET: &str = "All Technicians";

/// Suffix appended to the input workbook's base name for the output.
pub const OUTPUT_SUFFIX: &str = "-Combined";

const DETAIL_LABELS: [&str; 5] = ["Invoice", "Invoiced On", "Customer Name", "Memo", "Amount"];
const MASTER_LABELS: [&str; 12] = [
    "Invoice",
    "Invoiced On",
    "Customer Name",
    "Memo",
    "Amount",
    "Subtotal",
    "Commission (S)",
    "Commission (I)",
    "SPIFFS",
    "Sales Commission",
    "Truck Revenue",
    "Marketing Commission",
];

// Measured widths; Excel cannot auto-fit at write time.
const DETAIL_WIDTHS: [f64; 5] = [10.0, 15.0, 25.0, 20.0, 15.0];
const MASTER_WIDTHS: [f64; 12] = [
    10.0, 15.0, 25.0, 20.0, 15.0, 10.0, 15.0, 15.0, 8.0, 18.0, 15.0, 22.0,
];

const DATE_DISPLAY: &str = "%m/%d/%Y";
const MEMO_COLUMN: u16 = 3;
const AMOUNT_COLUMN: u16 = 4;
const CUSTOMER_COLUMN: u16 = 2;

/// Position of the master sheet in the output workbook.
const MASTER_INDEX: usize = 2;

/// A technician sheet in the composed workbook: the display name and the
/// sanitized sheet name it ended up under.
#[derive(Debug, Clone)]
pub struct TechnicianSheet {
    pub technician: String,
    pub sheet: String,
}

/// A fully composed report workbook, not yet persisted.
pub struct ComposedReport {
    workbook: Workbook,
    sheets: Vec<TechnicianSheet>,
}

impl ComposedReport {
    /// The technician sheets present, in grouper order.
    pub fn technician_sheets(&self) -> &[TechnicianSheet] {
        &self.sheets
    }

    /// Persists the workbook, classifying a locked target separately from
    /// other I/O failures.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        excel_write::save_workbook(&mut self.workbook, path)
    }
}

/// Row positions for a detail sheet and the master block mirroring it.
/// The pair advances together: every logical row lands on both sheets, so
/// a master mirror row always knows which detail row it references.
#[derive(Debug, Clone, Copy)]
struct RowCursors {
    detail: u32,
    master: u32,
}

impl RowCursors {
    fn advance(&mut self) {
        self.detail += 1;
        self.master += 1;
    }
}

/// Composes the output workbook for the given eligible technicians.
pub fn compose(
    sets: &RecordSets,
    technicians: &[String],
    lookup: &LookupCache,
    log: &mut RunLog,
) -> Result<ComposedReport> {
    let formats = ReportFormats::new();
    let mut workbook = Workbook::new();

    let mut registry = SheetNameRegistry::default();
    registry.claim(INVOICES_SHEET);
    registry.claim(ADJUSTMENTS_SHEET);
    registry.claim(MASTER_SHEET);

    write_raw_invoices(workbook.add_worksheet(), sets, &formats)?;
    write_raw_adjustments(workbook.add_worksheet(), sets, &formats)?;

    {
        let master = workbook.add_worksheet();
        master.set_name(MASTER_SHEET)?;
        for (column, width) in MASTER_WIDTHS.iter().enumerate() {
            master.set_column_width(column as u16, *width)?;
        }
    }

    let mut sheets = Vec::with_capacity(technicians.len());
    let mut master_next_row = 0u32;

    for (position, technician) in technicians.iter().enumerate() {
        log.info(format!("Preparing report for technician: {technician}..."));

        let sheet_name = registry.assign(technician);
        workbook.add_worksheet().set_name(&sheet_name)?;

        let entries = ledger::build_ledger(
            technician,
            sets.invoices_for(&Some(technician.clone())),
            sets.adjustments_for(&Some(technician.clone())),
            lookup,
            log,
        );

        let detail_index = MASTER_INDEX + 1 + position;
        let worksheets = workbook.worksheets_mut();
        let (head, tail) = worksheets.split_at_mut(detail_index);
        let master = &mut head[MASTER_INDEX];
        let detail = &mut tail[0];

        master_next_row = write_technician_block(
            detail,
            master,
            master_next_row,
            technician,
            &sheet_name,
            &entries,
            &formats,
        )?;

        sheets.push(TechnicianSheet {
            technician: technician.clone(),
            sheet: sheet_name,
        });
    }

    // The master highlight can only be applied once its full populated
    // range is known.
    if master_next_row > 2 {
        let master = &mut workbook.worksheets_mut()[MASTER_INDEX];
        let highlight = ConditionalFormatFormula::new()
            .set_rule(MISSING_CUSTOMER_RULE)
            .set_format(formats.highlight.clone());
        master.add_conditional_format(
            2,
            CUSTOMER_COLUMN,
            master_next_row - 1,
            CUSTOMER_COLUMN,
            &highlight,
        )?;
    }

    Ok(ComposedReport { workbook, sheets })
}

/// Writes one technician's detail sheet and the mirrored master block.
/// Returns the next free master row.
fn write_technician_block(
    detail: &mut Worksheet,
    master: &mut Worksheet,
    master_start: u32,
    technician: &str,
    sheet_name: &str,
    entries: &[LedgerEntry],
    formats: &ReportFormats,
) -> Result<u32> {
    let mut cursors = RowCursors {
        detail: 0,
        master: master_start,
    };

    // Title row, merged across the data columns on both sheets.
    detail.merge_range(
        cursors.detail,
        0,
        cursors.detail,
        AMOUNT_COLUMN,
        technician,
        &formats.title,
    )?;
    master.merge_range(
        cursors.master,
        0,
        cursors.master,
        AMOUNT_COLUMN,
        technician,
        &formats.master_title,
    )?;
    cursors.advance();

    // Column labels.
    for (column, label) in DETAIL_LABELS.iter().enumerate() {
        let format = if column as u16 == AMOUNT_COLUMN {
            &formats.label_right
        } else {
            &formats.label_left
        };
        detail.write_string_with_format(cursors.detail, column as u16, *label, format)?;
    }
    for (column, label) in MASTER_LABELS.iter().enumerate() {
        master.write_string_with_format(
            cursors.master,
            column as u16,
            *label,
            &formats.label_center,
        )?;
    }
    cursors.advance();

    let first_data_row = cursors.detail;

    for entry in entries {
        detail.write_number_with_format(cursors.detail, 0, entry.invoice as f64, &formats.data)?;
        detail.write_string_with_format(
            cursors.detail,
            1,
            &entry.date.format(DATE_DISPLAY).to_string(),
            &formats.data,
        )?;
        match entry.customer.as_deref() {
            Some(customer) => detail.write_string_with_format(
                cursors.detail,
                CUSTOMER_COLUMN,
                customer,
                &formats.data,
            )?,
            None => detail.write_blank(cursors.detail, CUSTOMER_COLUMN, &formats.data)?,
        };
        detail.write_string_with_format(
            cursors.detail,
            MEMO_COLUMN,
            &entry.memo,
            &formats.data_memo,
        )?;
        detail.write_number_with_format(
            cursors.detail,
            AMOUNT_COLUMN,
            entry.amount,
            &formats.data_currency,
        )?;

        // Mirror the five leading fields into the master as references,
        // rendered empty when the detail cell is blank so the highlight
        // rule sees a blank rather than a zero.
        for column in 0..=AMOUNT_COLUMN {
            let formula = mirror_formula(sheet_name, cursors.detail, column);
            if column == AMOUNT_COLUMN {
                master.write_formula_with_format(
                    cursors.master,
                    column,
                    formula.as_str(),
                    &formats.currency,
                )?;
            } else {
                master.write_formula(cursors.master, column, formula.as_str())?;
            }
        }
        for column in (AMOUNT_COLUMN + 1)..MASTER_LABELS.len() as u16 {
            // Aggregate commission/revenue placeholders; their values are
            // computed elsewhere.
            master.write_blank(cursors.master, column, &formats.currency)?;
        }
        cursors.advance();
    }

    // Total row: a live sum on the detail sheet, mirrored by reference on
    // the master.
    let total_row = cursors.detail;
    for column in 0..MEMO_COLUMN {
        detail.write_blank(total_row, column, &formats.total)?;
    }
    detail.write_string_with_format(total_row, MEMO_COLUMN, "Total:", &formats.total_label)?;
    let sum = format!(
        "=SUM({}:{})",
        cell_ref(first_data_row, AMOUNT_COLUMN),
        cell_ref(total_row - 1, AMOUNT_COLUMN),
    );
    detail.write_formula_with_format(
        total_row,
        AMOUNT_COLUMN,
        sum.as_str(),
        &formats.total_currency,
    )?;

    master.write_string_with_format(
        cursors.master,
        AMOUNT_COLUMN,
        "Total:",
        &formats.total_label,
    )?;
    let total_ref = mirror_formula(sheet_name, total_row, AMOUNT_COLUMN);
    master.write_formula_with_format(
        cursors.master,
        AMOUNT_COLUMN + 1,
        total_ref.as_str(),
        &formats.total_currency,
    )?;
    cursors.advance();

    // Highlight missing customer names across the data rows just written.
    if !entries.is_empty() {
        let highlight = ConditionalFormatFormula::new()
            .set_rule(MISSING_CUSTOMER_RULE)
            .set_format(formats.highlight.clone());
        detail.add_conditional_format(
            first_data_row,
            CUSTOMER_COLUMN,
            total_row,
            CUSTOMER_COLUMN,
            &highlight,
        )?;
    }

    for (column, width) in DETAIL_WIDTHS.iter().enumerate() {
        detail.set_column_width(column as u16, *width)?;
    }
    detail.set_column_width(MEMO_COLUMN, memo_column_width(entries))?;

    Ok(cursors.master)
}

/// Live reference into a detail cell, collapsing blanks to an empty
/// string so the master never displays a spurious zero.
fn mirror_formula(sheet_name: &str, row: u32, column: u16) -> String {
    let reference = sheet_cell_ref(sheet_name, row, column);
    format!("=IF({reference}=\"\",\"\",{reference})")
}

/// Auto-fit width for the memo column: the bold label, every memo, and
/// the bold total label all compete for the widest line.
fn memo_column_width(entries: &[LedgerEntry]) -> f64 {
    let fit = AutoFit::default();
    let mut cells: Vec<(DisplayValue, bool)> = Vec::with_capacity(entries.len() + 2);
    cells.push((
        DisplayValue::Text(DETAIL_LABELS[MEMO_COLUMN as usize].to_string()),
        true,
    ));
    cells.extend(
        entries
            .iter()
            .map(|entry| (DisplayValue::Text(entry.memo.clone()), false)),
    );
    cells.push((DisplayValue::Text("Total:".to_string()), true));

    fit.fit(cells.iter().map(|(value, bold)| (value, *bold)))
}

fn write_raw_invoices(
    worksheet: &mut Worksheet,
    sets: &RecordSets,
    formats: &ReportFormats,
) -> Result<()> {
    worksheet.set_name(INVOICES_SHEET)?;
    for (column, header) in INVOICE_HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, column as u16, *header, &formats.raw_header)?;
    }

    let mut row = 1u32;
    for technician in sets.technicians() {
        for record in sets.invoices_for(technician) {
            if let Some(name) = &record.technician {
                worksheet.write_string(row, 0, name)?;
            }
            worksheet.write_number(row, 1, record.invoice_id as f64)?;
            worksheet.write_number(row, 2, record.invoice as f64)?;
            worksheet.write_datetime_with_format(row, 3, &record.invoiced_on, &formats.raw_date)?;
            if let Some(customer) = &record.customer {
                worksheet.write_string(row, 4, customer)?;
            }
            worksheet.write_number(row, 5, record.total)?;
            worksheet.write_string(row, 6, record.split.as_raw())?;
            worksheet.write_number(row, 7, record.subtotal)?;
            worksheet.write_number(row, 8, record.cost)?;
            worksheet.write_number(row, 9, record.bonus)?;
            worksheet.write_number(row, 10, record.pay_adj)?;
            worksheet.write_number(row, 11, record.nc_total)?;
            if !record.net_serv_vol.is_empty() {
                worksheet.write_string(row, 12, &record.net_serv_vol)?;
            }
            worksheet.write_number(row, 13, record.gp)?;
            worksheet.write_string(row, 14, record.business_unit.as_str())?;
            row += 1;
        }
    }

    Ok(())
}

fn write_raw_adjustments(
    worksheet: &mut Worksheet,
    sets: &RecordSets,
    formats: &ReportFormats,
) -> Result<()> {
    worksheet.set_name(ADJUSTMENTS_SHEET)?;
    for (column, header) in ADJUSTMENT_HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, column as u16, *header, &formats.raw_header)?;
    }

    let mut row = 1u32;
    for technician in sets.technicians() {
        for record in sets.adjustments_for(technician) {
            if let Some(name) = &record.technician {
                worksheet.write_string(row, 0, name)?;
            }
            worksheet.write_number(row, 1, record.invoice_id as f64)?;
            worksheet.write_number(row, 2, record.invoice as f64)?;
            worksheet.write_datetime_with_format(row, 3, &record.posted_on, &formats.raw_date)?;
            worksheet.write_string(row, 4, &record.memo)?;
            worksheet.write_number(row, 5, record.amount)?;
            row += 1;
        }
    }

    Ok(())
}

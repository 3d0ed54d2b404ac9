use std::path::{Path, PathBuf};

use calamine::{DataType, Reader, Xlsx, open_workbook};
use chrono::NaiveDate;
use payroll_combine::ReportError;
use payroll_combine::events::RunLog;
use payroll_combine::io::excel_read::{ADJUSTMENT_HEADERS, INVOICE_HEADERS};
use payroll_combine::lookup::LookupCache;
use payroll_combine::run::{MergeRequest, merge_workbook};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use tempfile::tempdir;

const DATE_FORMAT: &str = "mm/dd/yyyy";

fn write_headers(worksheet: &mut Worksheet, headers: &[&str]) {
    for (column, header) in headers.iter().enumerate() {
        worksheet
            .write_string(0, column as u16, *header)
            .expect("header written");
    }
}

fn write_invoice_row(
    worksheet: &mut Worksheet,
    row: u32,
    technician: Option<&str>,
    invoice: i64,
    day: u32,
    customer: Option<&str>,
    gp: f64,
) {
    let date_format = Format::new().set_num_format(DATE_FORMAT);
    if let Some(name) = technician {
        worksheet.write_string(row, 0, name).unwrap();
        worksheet.write_number(row, 1, (invoice + 500_000) as f64).unwrap();
        worksheet.write_number(row, 2, invoice as f64).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 7, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        worksheet
            .write_datetime_with_format(row, 3, &date, &date_format)
            .unwrap();
        worksheet.write_string(row, 6, "100.00%").unwrap();
        worksheet.write_string(row, 14, "HVAC RESI SERV").unwrap();
    }
    if let Some(name) = customer {
        worksheet.write_string(row, 4, name).unwrap();
    }
    worksheet.write_number(row, 5, gp * 2.0).unwrap();
    worksheet.write_number(row, 7, gp * 1.8).unwrap();
    worksheet.write_number(row, 8, gp * 0.8).unwrap();
    worksheet.write_number(row, 9, 0.0).unwrap();
    worksheet.write_number(row, 10, 0.0).unwrap();
    worksheet.write_number(row, 11, 0.0).unwrap();
    worksheet.write_number(row, 13, gp).unwrap();
}

fn write_adjustment_row(
    worksheet: &mut Worksheet,
    row: u32,
    technician: &str,
    invoice: i64,
    day: u32,
    memo: &str,
    amount: f64,
) {
    let date_format = Format::new().set_num_format(DATE_FORMAT);
    worksheet.write_string(row, 0, technician).unwrap();
    worksheet.write_number(row, 1, (invoice + 500_000) as f64).unwrap();
    worksheet.write_number(row, 2, invoice as f64).unwrap();
    let date = NaiveDate::from_ymd_opt(2026, 7, day)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    worksheet
        .write_datetime_with_format(row, 3, &date, &date_format)
        .unwrap();
    worksheet.write_string(row, 4, memo).unwrap();
    worksheet.write_number(row, 5, amount).unwrap();
}

/// A payroll workbook with two reportable technicians, one technician
/// below the eligibility bar, a source aggregate row, and both junk
/// sheets present.
fn write_source_workbook(path: &Path) {
    let mut workbook = Workbook::new();

    let invoices = workbook.add_worksheet();
    invoices.set_name("Invoices").unwrap();
    write_headers(invoices, &INVOICE_HEADERS);
    // Kim: one real invoice, one zero-GP invoice (dropped from the
    // ledger), one invoice missing its customer name.
    write_invoice_row(invoices, 1, Some("Kim Reyes"), 9001, 10, Some("Acme Plumbing"), 50.0);
    write_invoice_row(invoices, 2, Some("Kim Reyes"), 9002, 12, Some("Maintenance LLC"), 0.0);
    write_invoice_row(invoices, 3, Some("Kim Reyes"), 9003, 5, None, 25.0);
    // Lee: a single profitable invoice.
    write_invoice_row(invoices, 4, Some("Lee Cole"), 9100, 8, Some("Birch Street HOA"), 80.0);
    // Zed: zero GP and no adjustments; never reported.
    write_invoice_row(invoices, 5, Some("Zed Ash"), 9200, 9, Some("Nope Inc"), 0.0);
    // Aggregate totals row emitted by the business system.
    write_invoice_row(invoices, 6, None, 0, 1, None, 155.0);

    let adjustments = workbook.add_worksheet();
    adjustments.set_name("Direct Payroll Adjustments").unwrap();
    write_headers(adjustments, &ADJUSTMENT_HEADERS);
    write_adjustment_row(adjustments, 1, "Kim Reyes", 9001, 11, "Callback deduction", -15.0);

    for junk in ["Commission Base Payroll Adj", "Non-job Purchase Orders"] {
        let sheet = workbook.add_worksheet();
        sheet.set_name(junk).unwrap();
        sheet.write_string(0, 0, "internal").unwrap();
    }

    workbook.save(path).unwrap();
}

fn write_lookup_workbook(path: &Path, entries: &[(i64, &str)]) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Sheet1").unwrap();
    sheet.write_string(0, 0, "Invoice Id").unwrap();
    sheet.write_string(0, 1, "Customer Name").unwrap();
    for (row, (invoice, name)) in entries.iter().enumerate() {
        sheet.write_number(row as u32 + 1, 0, *invoice as f64).unwrap();
        sheet.write_string(row as u32 + 1, 1, *name).unwrap();
    }
    workbook.save(path).unwrap();
}

struct Run {
    _dir: tempfile::TempDir,
    output_dir: PathBuf,
    report: payroll_combine::run::MergeReport,
    log: RunLog,
}

fn run_standard_merge() -> Run {
    let dir = tempdir().unwrap();
    let workbook_path = dir.path().join("Payroll Export.xlsx");
    let lookup_path = dir.path().join("lookup.xlsx");
    let output_dir = dir.path().join("out");

    write_source_workbook(&workbook_path);
    write_lookup_workbook(&lookup_path, &[(9003, "Found In Lookup Co")]);

    let request = MergeRequest {
        workbook: workbook_path,
        lookup: lookup_path,
        output_dir: output_dir.clone(),
    };
    let mut log = RunLog::new();
    let report = merge_workbook(&request, &mut log).expect("merge succeeds");

    Run {
        _dir: dir,
        output_dir,
        report,
        log,
    }
}

fn cell(range: &calamine::Range<DataType>, row: u32, col: u32) -> DataType {
    range.get_value((row, col)).cloned().unwrap_or(DataType::Empty)
}

#[test]
fn merge_produces_the_expected_sheet_set_in_order() {
    let run = run_standard_merge();
    assert_eq!(
        run.report.output_path,
        run.output_dir.join("Payroll Export-Combined.xlsx")
    );

    let workbook: Xlsx<_> = open_workbook(&run.report.output_path).unwrap();
    let names = workbook.sheet_names().to_vec();
    // Junk sheets gone, master at index 2, technicians in first-seen
    // order, Zed excluded.
    assert_eq!(
        names,
        vec![
            "Invoices".to_string(),
            "Direct Payroll Adjustments".to_string(),
            "All Technicians".to_string(),
            "Kim Reyes".to_string(),
            "Lee Cole".to_string(),
        ]
    );
}

#[test]
fn detail_sheet_rows_are_filtered_ordered_and_totalled() {
    let run = run_standard_merge();
    let mut workbook: Xlsx<_> = open_workbook(&run.report.output_path).unwrap();
    let range = workbook.worksheet_range("Kim Reyes").unwrap().unwrap();

    // Title + labels + three ledger entries (zero-GP invoice dropped)
    // + total row.
    assert_eq!(range.height(), 6);

    assert_eq!(cell(&range, 0, 0), DataType::String("Kim Reyes".to_string()));
    assert_eq!(cell(&range, 1, 4), DataType::String("Amount".to_string()));

    // Date-ordered: invoice 9003 (day 5), invoice 9001 (day 10),
    // adjustment on 9001 (day 11).
    assert_eq!(cell(&range, 2, 0), DataType::Float(9003.0));
    assert_eq!(cell(&range, 3, 0), DataType::Float(9001.0));
    assert_eq!(cell(&range, 4, 0), DataType::Float(9001.0));
    assert_eq!(
        cell(&range, 2, 1),
        DataType::String("07/05/2026".to_string())
    );

    // Customer resolution: 9003 has no customer in the workbook but is
    // present in the lookup table.
    assert_eq!(
        cell(&range, 2, 2),
        DataType::String("Found In Lookup Co".to_string())
    );
    // The adjustment borrows its invoice's customer and keeps its memo.
    assert_eq!(
        cell(&range, 4, 2),
        DataType::String("Acme Plumbing".to_string())
    );
    assert_eq!(
        cell(&range, 4, 3),
        DataType::String("Callback deduction".to_string())
    );
    assert_eq!(cell(&range, 4, 4), DataType::Float(-15.0));

    // Total row carries a live sum, not a literal.
    assert_eq!(cell(&range, 5, 3), DataType::String("Total:".to_string()));
    let formulas = workbook.worksheet_formula("Kim Reyes").unwrap().unwrap();
    let total = formulas.get_value((5, 4)).cloned().unwrap_or_default();
    assert!(total.contains("SUM(E3:E5)"), "unexpected total formula: {total}");
}

#[test]
fn master_rows_are_live_references_not_copied_values() {
    let run = run_standard_merge();
    let mut workbook: Xlsx<_> = open_workbook(&run.report.output_path).unwrap();

    let formulas = workbook
        .worksheet_formula("All Technicians")
        .unwrap()
        .unwrap();

    // Kim's block: title row 1, labels row 2, data rows 3..5, total row 6
    // (1-based). The first data row mirrors detail row 3 cell by cell.
    for (column, letter) in ["A", "B", "C", "D", "E"].iter().enumerate() {
        let formula = formulas
            .get_value((2, column as u32))
            .cloned()
            .unwrap_or_default();
        let reference = format!("'Kim Reyes'!{letter}3");
        assert!(
            formula.contains(&reference) && formula.contains("IF("),
            "row 3 column {letter} is not a guarded reference: {formula}"
        );
    }

    // The mirrored total points at the detail total cell (detail row 6).
    let total_ref = formulas.get_value((5, 5)).cloned().unwrap_or_default();
    assert!(
        total_ref.contains("'Kim Reyes'!E6"),
        "unexpected master total reference: {total_ref}"
    );

    // Lee's block starts right below Kim's.
    let range = workbook.worksheet_range("All Technicians").unwrap().unwrap();
    assert_eq!(cell(&range, 6, 0), DataType::String("Lee Cole".to_string()));
    assert_eq!(
        cell(&range, 7, 11),
        DataType::String("Marketing Commission".to_string())
    );
}

#[test]
fn missing_customer_everywhere_is_a_warning_not_an_abort() {
    let dir = tempdir().unwrap();
    let workbook_path = dir.path().join("book.xlsx");
    let lookup_path = dir.path().join("lookup.xlsx");

    let mut workbook = Workbook::new();
    let invoices = workbook.add_worksheet();
    invoices.set_name("Invoices").unwrap();
    write_headers(invoices, &INVOICE_HEADERS);
    write_invoice_row(invoices, 1, Some("Kim Reyes"), 7777, 3, None, 40.0);
    let adjustments = workbook.add_worksheet();
    adjustments.set_name("Direct Payroll Adjustments").unwrap();
    write_headers(adjustments, &ADJUSTMENT_HEADERS);
    workbook.save(&workbook_path).unwrap();

    write_lookup_workbook(&lookup_path, &[]);

    let request = MergeRequest {
        workbook: workbook_path,
        lookup: lookup_path,
        output_dir: dir.path().join("out"),
    };
    let mut log = RunLog::new();
    let report = merge_workbook(&request, &mut log).expect("run continues");

    assert!(log.events().iter().any(|event| {
        event.message.contains("invoice 7777") && event.message.contains("Kim Reyes")
    }));

    let mut output: Xlsx<_> = open_workbook(&report.output_path).unwrap();
    let range = output.worksheet_range("Kim Reyes").unwrap().unwrap();
    // Customer cell stays blank, never a zero.
    assert_eq!(cell(&range, 2, 2), DataType::Empty);
}

#[test]
fn header_mismatch_names_the_column_and_both_values() {
    let dir = tempdir().unwrap();
    let workbook_path = dir.path().join("book.xlsx");
    let lookup_path = dir.path().join("lookup.xlsx");

    let mut workbook = Workbook::new();
    let invoices = workbook.add_worksheet();
    invoices.set_name("Invoices").unwrap();
    let mut headers = INVOICE_HEADERS;
    headers[6] = "Split Pct";
    write_headers(invoices, &headers);
    let adjustments = workbook.add_worksheet();
    adjustments.set_name("Direct Payroll Adjustments").unwrap();
    write_headers(adjustments, &ADJUSTMENT_HEADERS);
    workbook.save(&workbook_path).unwrap();

    write_lookup_workbook(&lookup_path, &[]);

    let output_dir = dir.path().join("out");
    let request = MergeRequest {
        workbook: workbook_path,
        lookup: lookup_path,
        output_dir: output_dir.clone(),
    };
    let mut log = RunLog::new();
    match merge_workbook(&request, &mut log) {
        Err(ReportError::HeaderMismatch {
            sheet,
            column,
            expected,
            actual,
        }) => {
            assert_eq!(sheet, "Invoices");
            assert_eq!(column, 7);
            assert_eq!(expected, "Split %");
            assert_eq!(actual, "Split Pct");
        }
        other => panic!("expected HeaderMismatch, got {other:?}"),
    }

    // A structural failure leaves no partial output document.
    assert!(!output_dir.join("book-Combined.xlsx").exists());
}

#[test]
fn missing_required_sheet_aborts() {
    let dir = tempdir().unwrap();
    let workbook_path = dir.path().join("book.xlsx");
    let lookup_path = dir.path().join("lookup.xlsx");

    let mut workbook = Workbook::new();
    let invoices = workbook.add_worksheet();
    invoices.set_name("Invoices").unwrap();
    write_headers(invoices, &INVOICE_HEADERS);
    workbook.save(&workbook_path).unwrap();

    write_lookup_workbook(&lookup_path, &[]);

    let request = MergeRequest {
        workbook: workbook_path,
        lookup: lookup_path,
        output_dir: dir.path().join("out"),
    };
    let mut log = RunLog::new();
    match merge_workbook(&request, &mut log) {
        Err(ReportError::MissingSheet(name)) => {
            assert_eq!(name, "Direct Payroll Adjustments");
        }
        other => panic!("expected MissingSheet, got {other:?}"),
    }
}

#[test]
fn lookup_conversion_round_trips_and_artifact_is_cleaned_up() {
    let dir = tempdir().unwrap();
    let lookup_path = dir.path().join("lookup.xlsx");
    let output_dir = dir.path().join("out");
    write_lookup_workbook(&lookup_path, &[(11, "First Co"), (22, "Second Co")]);

    let mut log = RunLog::new();
    let mut cache = LookupCache::load(&lookup_path, &output_dir, &mut log).unwrap();

    // Write-through artifact exists and decodes to the same mapping.
    let artifact = cache.artifact_path().unwrap().to_path_buf();
    assert!(artifact.exists());
    let reloaded: std::collections::BTreeMap<i64, String> =
        serde_json::from_str(&std::fs::read_to_string(&artifact).unwrap()).unwrap();
    assert_eq!(reloaded.get(&11).map(String::as_str), Some("First Co"));
    assert_eq!(reloaded.len(), 2);
    assert_eq!(cache.resolve(22), Some("Second Co"));

    // The xlsx source survives; only the ephemeral artifact is removed.
    cache.release(&mut log);
    assert!(!artifact.exists());
    assert!(lookup_path.exists());
}

#[test]
fn merge_deletes_the_lookup_artifact_after_the_run() {
    let run = run_standard_merge();
    assert!(!run.output_dir.join("LookupTable.json").exists());
    assert!(run.log.warning_count() <= 1);
}

#[test]
fn rerunning_an_unchanged_input_is_structurally_identical() {
    let dir = tempdir().unwrap();
    let workbook_path = dir.path().join("Payroll Export.xlsx");
    let lookup_path = dir.path().join("lookup.xlsx");
    write_source_workbook(&workbook_path);

    let mut snapshots = Vec::new();
    for pass in 0..2 {
        // The artifact is deleted at the end of each run; the xlsx source
        // is reused as-is.
        write_lookup_workbook(&lookup_path, &[(9003, "Found In Lookup Co")]);
        let request = MergeRequest {
            workbook: workbook_path.clone(),
            lookup: lookup_path.clone(),
            output_dir: dir.path().join(format!("out-{pass}")),
        };
        let mut log = RunLog::new();
        let report = merge_workbook(&request, &mut log).unwrap();

        let mut workbook: Xlsx<_> = open_workbook(&report.output_path).unwrap();
        let names = workbook.sheet_names().to_vec();
        let mut heights = Vec::new();
        let mut customers = Vec::new();
        for name in &names {
            let range = workbook.worksheet_range(name).unwrap().unwrap();
            heights.push(range.height());
            if name == "Kim Reyes" {
                customers.push(cell(&range, 2, 2));
            }
        }
        snapshots.push((names, heights, customers));
    }

    assert_eq!(snapshots[0], snapshots[1]);
}

#[test]
fn zero_amount_adjustment_flips_eligibility() {
    let dir = tempdir().unwrap();
    let workbook_path = dir.path().join("book.xlsx");
    let lookup_path = dir.path().join("lookup.xlsx");

    let mut workbook = Workbook::new();
    let invoices = workbook.add_worksheet();
    invoices.set_name("Invoices").unwrap();
    write_headers(invoices, &INVOICE_HEADERS);
    write_invoice_row(invoices, 1, Some("Zed Ash"), 9200, 9, Some("Nope Inc"), 0.0);
    let adjustments = workbook.add_worksheet();
    adjustments.set_name("Direct Payroll Adjustments").unwrap();
    write_headers(adjustments, &ADJUSTMENT_HEADERS);
    write_adjustment_row(adjustments, 1, "Zed Ash", 9200, 9, "Reinstated", 0.0);
    workbook.save(&workbook_path).unwrap();

    write_lookup_workbook(&lookup_path, &[]);

    let request = MergeRequest {
        workbook: workbook_path,
        lookup: lookup_path,
        output_dir: dir.path().join("out"),
    };
    let mut log = RunLog::new();
    let report = merge_workbook(&request, &mut log).unwrap();

    // With only the zero-GP invoice Zed would be excluded; the zero
    // adjustment pulls the technician back in, and the adjustment row is
    // shown despite its amount.
    assert_eq!(report.sheets.len(), 1);
    assert_eq!(report.sheets[0].technician, "Zed Ash");

    let mut output: Xlsx<_> = open_workbook(&report.output_path).unwrap();
    let range = output.worksheet_range("Zed Ash").unwrap().unwrap();
    // Title, labels, one adjustment row, total.
    assert_eq!(range.height(), 4);
    assert_eq!(cell(&range, 2, 3), DataType::String("Reinstated".to_string()));
    assert_eq!(cell(&range, 2, 4), DataType::Float(0.0));
}

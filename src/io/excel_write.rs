//! Shared workbook-writing helpers for the report composer.
//!
//! Owns the reusable cell formats, Excel sheet-name sanitation (technician
//! names become sheet names and must fit Excel's rules), A1 reference
//! helpers for the live master→detail formulas, and the save step that
//! distinguishes a locked output file from other persistence failures.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook};

use crate::error::{ReportError, Result};

/// USD currency display used for amount columns.
pub const CURRENCY_FORMAT: &str = "$#,##0.00";
/// Date display for native date cells in the re-emitted raw sheets.
pub const DATE_FORMAT: &str = "mm/dd/yyyy";

/// Conditional-formatting rule flagging rows whose invoice cell is filled
/// but whose customer-name cell is blank after trimming. Relative rows
/// anchor at row 3, the first data row of every block.
pub const MISSING_CUSTOMER_RULE: &str = "=AND(LEN($A3)>0,LEN(TRIM($C3&\"\"))=0)";

const ROW_BORDER_COLOR: u32 = 0xD9D9D9;
const HIGHLIGHT_FILL: u32 = 0xFFFF00;

/// The cell formats used across the report sheets, built once per
/// composition. Detail-sheet rows carry the thin bottom border; the
/// master mirrors data without borders.
#[derive(Debug)]
pub struct ReportFormats {
    /// Technician-name title on a detail sheet.
    pub title: Format,
    /// Technician-name title on the master sheet.
    pub master_title: Format,
    /// Detail-sheet column label.
    pub label_left: Format,
    /// Detail-sheet amount label.
    pub label_right: Format,
    /// Master-sheet column label.
    pub label_center: Format,
    /// Plain detail data cell.
    pub data: Format,
    /// Detail amount cell.
    pub data_currency: Format,
    /// Detail memo cell: wrapped, left-aligned.
    pub data_memo: Format,
    /// Master amount/placeholder cell.
    pub currency: Format,
    /// `Total:` label.
    pub total_label: Format,
    /// Non-amount cell on the total row.
    pub total: Format,
    /// Total amount cell.
    pub total_currency: Format,
    /// Fill applied by the missing-customer conditional rule.
    pub highlight: Format,
    /// Header cell on the re-emitted raw sheets.
    pub raw_header: Format,
    /// Date cell on the re-emitted raw sheets.
    pub raw_date: Format,
}

impl ReportFormats {
    pub fn new() -> Self {
        let bordered = || {
            Format::new()
                .set_border_bottom(FormatBorder::Thin)
                .set_border_bottom_color(Color::RGB(ROW_BORDER_COLOR))
        };
        let title = |format: Format| {
            format
                .set_bold()
                .set_font_size(14.0)
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter)
        };

        Self {
            title: title(bordered()),
            master_title: title(Format::new()),
            label_left: bordered()
                .set_bold()
                .set_align(FormatAlign::Left)
                .set_align(FormatAlign::VerticalCenter),
            label_right: bordered()
                .set_bold()
                .set_align(FormatAlign::Right)
                .set_align(FormatAlign::VerticalCenter),
            label_center: Format::new()
                .set_bold()
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter),
            data: bordered(),
            data_currency: bordered().set_num_format(CURRENCY_FORMAT),
            data_memo: bordered().set_text_wrap().set_align(FormatAlign::Left),
            currency: Format::new().set_num_format(CURRENCY_FORMAT),
            total_label: Format::new()
                .set_bold()
                .set_align(FormatAlign::Right)
                .set_align(FormatAlign::VerticalCenter),
            total: Format::new().set_bold(),
            total_currency: Format::new().set_bold().set_num_format(CURRENCY_FORMAT),
            highlight: Format::new().set_background_color(Color::RGB(HIGHLIGHT_FILL)),
            raw_header: Format::new().set_bold(),
            raw_date: Format::new().set_num_format(DATE_FORMAT),
        }
    }
}

impl Default for ReportFormats {
    fn default() -> Self {
        Self::new()
    }
}

/// Assigns Excel-legal, collision-free sheet names.
#[derive(Debug, Default)]
pub struct SheetNameRegistry {
    used: HashSet<String>,
}

impl SheetNameRegistry {
    /// Reserves a name without sanitizing it, e.g. the fixed sheets.
    pub fn claim(&mut self, name: &str) {
        self.used.insert(name.to_string());
    }

    /// Sanitizes `raw` and appends a numeric suffix until the name is
    /// unique within the workbook.
    pub fn assign(&mut self, raw: &str) -> String {
        let base = sanitize_sheet_name(raw);
        if !self.used.contains(&base) {
            self.used.insert(base.clone());
            return base;
        }

        let mut counter = 1;
        loop {
            let suffix = format!("_{counter}");
            let max_len = 31 - suffix.len();
            let mut prefix = base.clone();
            if prefix.len() > max_len {
                prefix.truncate(max_len);
            }
            let candidate = format!("{prefix}{suffix}");
            if !self.used.contains(&candidate) {
                self.used.insert(candidate.clone());
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Replaces the characters Excel forbids in sheet names and clamps to the
/// 31-character limit.
pub fn sanitize_sheet_name(raw: &str) -> String {
    let invalid = [':', '\\', '/', '?', '*', '[', ']', '\'', '"'];
    let mut sanitized: String = raw
        .chars()
        .map(|ch| {
            if invalid.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();

    sanitized = sanitized.trim().to_string();
    if sanitized.is_empty() {
        sanitized = "Sheet".to_string();
    }

    if sanitized.len() > 31 {
        sanitized.truncate(31);
    }

    sanitized
}

/// 0-based column index to Excel letters.
pub fn column_letter(col: u16) -> String {
    let mut remainder = col as u32;
    let mut letters = Vec::new();
    loop {
        letters.push(char::from(b'A' + (remainder % 26) as u8));
        if remainder < 26 {
            break;
        }
        remainder = remainder / 26 - 1;
    }
    letters.iter().rev().collect()
}

/// 0-based (row, col) to an A1 reference.
pub fn cell_ref(row: u32, col: u16) -> String {
    format!("{}{}", column_letter(col), row + 1)
}

/// A1 reference into another sheet, with embedded quotes doubled per
/// Excel's quoting rules.
pub fn sheet_cell_ref(sheet: &str, row: u32, col: u16) -> String {
    format!("'{}'!{}", sheet.replace('\'', "''"), cell_ref(row, col))
}

/// Serializes the workbook and writes it to `path`, classifying a target
/// held open by another process as the recoverable [`ReportError::OutputLocked`].
pub fn save_workbook(workbook: &mut Workbook, path: &Path) -> Result<()> {
    let buffer = workbook.save_to_buffer()?;
    match fs::write(path, buffer) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == ErrorKind::PermissionDenied => {
            Err(ReportError::OutputLocked(path.to_path_buf()))
        }
        Err(error) => Err(ReportError::Persistence {
            path: path.to_path_buf(),
            source: error,
        }),
    }
}

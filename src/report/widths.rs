//! Column auto-fit from estimated rendered text width.
//!
//! Excel sizes columns at render time; a writer has to estimate. The
//! estimate here renders a cell the way the sheet will display it (dates
//! formatted, currency with symbol/separators/two decimals), measures the
//! widest line of multi-line text, scales bold text up slightly, and
//! clamps the result to a band that still fits a printed page.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// A cell value as the width estimator sees it.
#[derive(Debug, Clone)]
pub enum DisplayValue {
    Empty,
    Text(String),
    Number(f64),
    Currency(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
}

/// Renders the value roughly as Excel will display it.
pub fn display_text(value: &DisplayValue) -> String {
    match value {
        DisplayValue::Empty => String::new(),
        DisplayValue::Text(text) => text.clone(),
        DisplayValue::Number(number) => number.to_string(),
        DisplayValue::Currency(amount) => format_currency(*amount),
        DisplayValue::Date(date) => date.format("%m/%d/%Y").to_string(),
        DisplayValue::DateTime(value) => {
            if value.time() == midnight() {
                value.format("%m/%d/%Y").to_string()
            } else {
                value.format("%m/%d/%Y %H:%M").to_string()
            }
        }
        DisplayValue::Time(time) => time.format("%H:%M").to_string(),
    }
}

fn midnight() -> NaiveTime {
    NaiveTime::from_hms_opt(0, 0, 0).expect("midnight is a valid time")
}

/// `$1,234.56` with a thousands separator and two decimals; the sign
/// rides between the symbol and the digits, matching Excel's default.
pub fn format_currency(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let dollars = cents / 100;
    let fraction = cents % 100;

    let digits = dollars.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("${sign}{grouped}.{fraction:02}")
}

/// Auto-fit policy for one column.
#[derive(Debug, Clone, Copy)]
pub struct AutoFit {
    pub min_width: f64,
    pub max_width: f64,
    pub padding: f64,
    pub bold_scalar: f64,
}

impl Default for AutoFit {
    fn default() -> Self {
        Self {
            min_width: 15.0,
            max_width: 35.0,
            padding: 2.0,
            bold_scalar: 1.08,
        }
    }
}

impl AutoFit {
    /// Width for a column containing `cells` of `(value, bold)` pairs.
    pub fn fit<'a>(&self, cells: impl IntoIterator<Item = (&'a DisplayValue, bool)>) -> f64 {
        let mut max_chars = 0.0_f64;
        for (value, bold) in cells {
            let text = display_text(value);
            if text.is_empty() {
                continue;
            }
            let chars = self.measure(&text, bold);
            if chars > max_chars {
                max_chars = chars;
            }
        }

        (max_chars + self.padding).clamp(self.min_width, self.max_width)
    }

    /// Character width of one rendered cell: the widest line of the text,
    /// scaled up when bold.
    fn measure(&self, text: &str, bold: bool) -> f64 {
        let widest = text
            .lines()
            .map(|line| line.chars().count())
            .max()
            .unwrap_or(0) as f64;
        if bold { widest * self.bold_scalar } else { widest }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_renders_with_separators_and_two_decimals() {
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(1234.5), "$1,234.50");
        assert_eq!(format_currency(1_000_000.0), "$1,000,000.00");
        assert_eq!(format_currency(-1234.5), "$-1,234.50");
    }

    #[test]
    fn dates_render_like_the_sheet_shows_them() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();
        assert_eq!(display_text(&DisplayValue::Date(date)), "07/04/2024");

        let afternoon = date.and_hms_opt(13, 30, 0).unwrap();
        assert_eq!(
            display_text(&DisplayValue::DateTime(afternoon)),
            "07/04/2024 13:30"
        );
        let midnight = date.and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(display_text(&DisplayValue::DateTime(midnight)), "07/04/2024");
    }

    #[test]
    fn multiline_text_is_measured_by_its_widest_line() {
        let fit = AutoFit::default();
        let memo = DisplayValue::Text("short\na much, much longer second line".to_string());
        let width = fit.fit([(&memo, false)]);
        assert_eq!(width, 32.0 + 2.0);
    }

    #[test]
    fn width_is_clamped_to_the_configured_band() {
        let fit = AutoFit::default();

        let tiny = DisplayValue::Text("ok".to_string());
        assert_eq!(fit.fit([(&tiny, false)]), fit.min_width);

        let huge = DisplayValue::Text("x".repeat(120));
        assert_eq!(fit.fit([(&huge, false)]), fit.max_width);

        assert_eq!(
            fit.fit(std::iter::empty::<(&DisplayValue, bool)>()),
            fit.min_width
        );
    }

    #[test]
    fn bold_text_is_scaled_up() {
        let fit = AutoFit::default();
        let label = DisplayValue::Text("Memo column header".to_string());
        let plain = fit.fit([(&label, false)]);
        let bold = fit.fit([(&label, true)]);
        assert!(bold > plain);
    }
}

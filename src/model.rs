//! Typed records decoded from the payroll workbook.
//!
//! Records are immutable once decoded: the parser builds them row by row,
//! the grouper and composer only read them, and they are dropped when the
//! output workbook has been persisted.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Marker suffix on the raw `Net Serv. Vol.` text flagging net service
/// volume rows.
pub const NET_SERVICE_VOLUME_MARKER: char = '*';

/// Commission split reported on an invoice line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitType {
    /// `100.00%`: the full amount is attributed to the technician.
    Full,
    /// `0.00%`: no split applies.
    None,
    /// `SB`: split by sale.
    SplitBySale,
}

impl SplitType {
    /// Parses the raw cell text. A blank cell reads as [`SplitType::None`].
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "" | "0.00%" => Some(SplitType::None),
            "100.00%" => Some(SplitType::Full),
            "SB" => Some(SplitType::SplitBySale),
            _ => None,
        }
    }

    /// The raw code as it appears in the source workbook.
    pub fn as_raw(&self) -> &'static str {
        match self {
            SplitType::Full => "100.00%",
            SplitType::None => "0.00%",
            SplitType::SplitBySale => "SB",
        }
    }
}

/// Business-unit code attached to an invoice line. The set of codes is
/// site-specific and grows over time, so the code is validated to be
/// non-empty rather than matched against a closed list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessUnit(String);

impl BusinessUnit {
    pub fn new(code: impl Into<String>) -> Option<Self> {
        let code = code.into();
        let trimmed = code.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One billed-service invoice line from the `Invoices` sheet.
///
/// `technician` is `None` only on the aggregate totals row the business
/// system appends to the export; that row never becomes a report sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub technician: Option<String>,
    pub invoice_id: i64,
    pub invoice: i64,
    pub invoiced_on: NaiveDateTime,
    pub customer: Option<String>,
    pub total: f64,
    pub split: SplitType,
    pub subtotal: f64,
    pub cost: f64,
    pub bonus: f64,
    pub pay_adj: f64,
    pub nc_total: f64,
    pub net_serv_vol: String,
    pub gp: f64,
    pub business_unit: BusinessUnit,
}

impl InvoiceRecord {
    /// True when the raw `Net Serv. Vol.` text carries the marker suffix.
    /// Derived on demand, never stored independently.
    pub fn net_service_volume_flag(&self) -> bool {
        self.net_serv_vol.ends_with(NET_SERVICE_VOLUME_MARKER)
    }
}

/// One direct payroll adjustment line. Adjustments carry no customer name
/// and are always reported, even at a zero amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentRecord {
    pub technician: Option<String>,
    pub invoice_id: i64,
    pub invoice: i64,
    pub posted_on: NaiveDateTime,
    pub memo: String,
    pub amount: f64,
}

/// Decoded records partitioned by technician, preserving the order in
/// which technician names were first encountered during parsing. Built
/// once by the parser and read-only afterwards.
#[derive(Debug, Default)]
pub struct RecordSets {
    order: Vec<Option<String>>,
    invoices: HashMap<Option<String>, Vec<InvoiceRecord>>,
    adjustments: HashMap<Option<String>, Vec<AdjustmentRecord>>,
}

impl RecordSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_invoice(&mut self, record: InvoiceRecord) {
        self.note(&record.technician);
        self.invoices
            .entry(record.technician.clone())
            .or_default()
            .push(record);
    }

    pub fn push_adjustment(&mut self, record: AdjustmentRecord) {
        self.note(&record.technician);
        self.adjustments
            .entry(record.technician.clone())
            .or_default()
            .push(record);
    }

    fn note(&mut self, technician: &Option<String>) {
        if !self.order.contains(technician) {
            self.order.push(technician.clone());
        }
    }

    /// Technician keys in first-encountered order. The `None` key holds
    /// records from the source's aggregate row.
    pub fn technicians(&self) -> impl Iterator<Item = &Option<String>> {
        self.order.iter()
    }

    pub fn invoices_for(&self, technician: &Option<String>) -> &[InvoiceRecord] {
        self.invoices
            .get(technician)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn adjustments_for(&self, technician: &Option<String>) -> &[AdjustmentRecord] {
        self.adjustments
            .get(technician)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Total number of decoded invoice rows across all technicians.
    pub fn invoice_count(&self) -> usize {
        self.invoices.values().map(Vec::len).sum()
    }

    /// Total number of decoded adjustment rows across all technicians.
    pub fn adjustment_count(&self) -> usize {
        self.adjustments.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

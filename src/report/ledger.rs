//! Per-technician ledger assembly.
//!
//! Merges one technician's invoices and direct payroll adjustments into a
//! single date-ordered ledger, resolves customer names, and drops
//! zero-amount invoice lines. The ledger is transient: built per
//! technician per run and discarded once the sheet is written.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::events::RunLog;
use crate::lookup::LookupCache;
use crate::model::{AdjustmentRecord, InvoiceRecord};

/// Memo shown for invoice-type entries, which have none of their own.
pub const INVOICE_MEMO: &str = "---";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Invoice,
    Adjustment,
}

/// One merged, date-ordered unit on a technician's report.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub kind: EntryKind,
    pub invoice: i64,
    pub date: NaiveDateTime,
    pub customer: Option<String>,
    pub memo: String,
    pub amount: f64,
}

/// Builds the ledger for one technician.
///
/// Invoice entries report gross profit as their amount and are dropped
/// when that amount is exactly zero; adjustment entries report their
/// signed amount and are always kept. Sorting is ascending by display
/// date and stable, so entries sharing a date keep their input order
/// (invoices before adjustments, each in source order).
pub fn build_ledger(
    technician: &str,
    invoices: &[InvoiceRecord],
    adjustments: &[AdjustmentRecord],
    lookup: &LookupCache,
    log: &mut RunLog,
) -> Vec<LedgerEntry> {
    // Adjustments carry no customer field; an adjustment posted against a
    // billed invoice borrows the name from that invoice when it is known.
    let mut own_customers: HashMap<i64, &str> = HashMap::new();
    for invoice in invoices {
        if let Some(customer) = non_blank(invoice.customer.as_deref()) {
            own_customers.insert(invoice.invoice, customer);
        }
    }

    let mut entries: Vec<LedgerEntry> = Vec::with_capacity(invoices.len() + adjustments.len());

    for invoice in invoices {
        if invoice.gp == 0.0 {
            // Nothing to pay out on the line; the technician does not
            // need to see it.
            continue;
        }
        let customer = resolve_customer(
            technician,
            invoice.invoice,
            non_blank(invoice.customer.as_deref()),
            lookup,
            log,
        );
        entries.push(LedgerEntry {
            kind: EntryKind::Invoice,
            invoice: invoice.invoice,
            date: invoice.invoiced_on,
            customer,
            memo: INVOICE_MEMO.to_string(),
            amount: invoice.gp,
        });
    }

    for adjustment in adjustments {
        let customer = resolve_customer(
            technician,
            adjustment.invoice,
            own_customers.get(&adjustment.invoice).copied(),
            lookup,
            log,
        );
        entries.push(LedgerEntry {
            kind: EntryKind::Adjustment,
            invoice: adjustment.invoice,
            date: adjustment.posted_on,
            customer,
            memo: adjustment.memo.clone(),
            amount: adjustment.amount,
        });
    }

    entries.sort_by(|lhs, rhs| lhs.date.cmp(&rhs.date));
    entries
}

fn resolve_customer(
    technician: &str,
    invoice: i64,
    own: Option<&str>,
    lookup: &LookupCache,
    log: &mut RunLog,
) -> Option<String> {
    if let Some(customer) = own {
        return Some(customer.to_string());
    }
    if let Some(customer) = lookup.resolve(invoice) {
        return Some(customer.to_string());
    }
    log.warning(format!(
        "Missing customer name for invoice {invoice} for technician {technician}."
    ));
    None
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::LookupTable;
    use crate::model::{BusinessUnit, SplitType};
    use chrono::NaiveDate;

    fn date(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn invoice(number: i64, day: u32, customer: Option<&str>, gp: f64) -> InvoiceRecord {
        InvoiceRecord {
            technician: Some("Kim Reyes".to_string()),
            invoice_id: number,
            invoice: number,
            invoiced_on: date(day),
            customer: customer.map(str::to_string),
            total: gp * 2.0,
            split: SplitType::Full,
            subtotal: gp * 1.8,
            cost: gp,
            bonus: 0.0,
            pay_adj: 0.0,
            nc_total: 0.0,
            net_serv_vol: String::new(),
            gp,
            business_unit: BusinessUnit::new("HVAC RESI SERV").unwrap(),
        }
    }

    fn adjustment(number: i64, day: u32, memo: &str, amount: f64) -> AdjustmentRecord {
        AdjustmentRecord {
            technician: Some("Kim Reyes".to_string()),
            invoice_id: number,
            invoice: number,
            posted_on: date(day),
            memo: memo.to_string(),
            amount,
        }
    }

    fn empty_lookup() -> LookupCache {
        LookupCache::from_table(LookupTable::new())
    }

    #[test]
    fn entries_are_date_ordered_with_stable_ties() {
        let invoices = vec![
            invoice(3, 10, Some("Acme"), 30.0),
            invoice(1, 5, Some("Acme"), 10.0),
            invoice(2, 10, Some("Acme"), 20.0),
        ];
        let adjustments = vec![adjustment(9, 10, "Spiff", 5.0)];

        let mut log = RunLog::new();
        let ledger = build_ledger(
            "Kim Reyes",
            &invoices,
            &adjustments,
            &empty_lookup(),
            &mut log,
        );

        let order: Vec<i64> = ledger.iter().map(|entry| entry.invoice).collect();
        // Day 5 first; the three day-10 entries keep input order, the
        // adjustment after the invoices it arrived behind.
        assert_eq!(order, vec![1, 3, 2, 9]);
        assert!(ledger.windows(2).all(|pair| pair[0].date <= pair[1].date));
    }

    #[test]
    fn zero_gp_invoices_are_dropped_but_zero_adjustments_kept() {
        let invoices = vec![
            invoice(1, 5, Some("Acme"), 0.0),
            invoice(2, 6, Some("Acme"), 12.0),
        ];
        let adjustments = vec![adjustment(7, 7, "Correction", 0.0)];

        let mut log = RunLog::new();
        let ledger = build_ledger(
            "Kim Reyes",
            &invoices,
            &adjustments,
            &empty_lookup(),
            &mut log,
        );

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger[0].invoice, 2);
        assert_eq!(ledger[1].kind, EntryKind::Adjustment);
        assert_eq!(ledger[1].amount, 0.0);
    }

    #[test]
    fn blank_customer_falls_through_to_the_lookup_table() {
        let mut table = LookupTable::new();
        table.insert(4, "Looked Up LLC".to_string());
        let lookup = LookupCache::from_table(table);

        let invoices = vec![invoice(4, 5, Some("   "), 25.0)];
        let mut log = RunLog::new();
        let ledger = build_ledger("Kim Reyes", &invoices, &[], &lookup, &mut log);

        assert_eq!(ledger[0].customer.as_deref(), Some("Looked Up LLC"));
        assert_eq!(log.warning_count(), 0);
    }

    #[test]
    fn unresolvable_customer_stays_blank_and_warns() {
        let invoices = vec![invoice(4, 5, None, 25.0)];
        let mut log = RunLog::new();
        let ledger = build_ledger("Kim Reyes", &invoices, &[], &empty_lookup(), &mut log);

        assert_eq!(ledger[0].customer, None);
        assert_eq!(log.warning_count(), 1);
        assert!(log.events()[0].message.contains("invoice 4"));
        assert!(log.events()[0].message.contains("Kim Reyes"));
    }

    #[test]
    fn adjustments_borrow_the_customer_of_their_invoice() {
        let invoices = vec![invoice(4, 5, Some("Acme"), 25.0)];
        let adjustments = vec![adjustment(4, 8, "Callback", -10.0)];

        let mut log = RunLog::new();
        let ledger = build_ledger(
            "Kim Reyes",
            &invoices,
            &adjustments,
            &empty_lookup(),
            &mut log,
        );

        assert_eq!(ledger[1].customer.as_deref(), Some("Acme"));
        assert_eq!(ledger[1].memo, "Callback");
    }
}

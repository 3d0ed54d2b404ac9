//! Technician grouping and report eligibility.

use crate::model::RecordSets;

/// Technicians eligible for a report sheet, in the order their names were
/// first encountered during parsing.
pub fn eligible_technicians(sets: &RecordSets) -> Vec<String> {
    sets.technicians()
        .filter_map(|technician| {
            let name = technician.as_ref()?;
            if is_eligible(sets, technician) {
                Some(name.clone())
            } else {
                None
            }
        })
        .collect()
}

/// A technician is reportable when they have at least one record at all
/// and either a positive invoice gross-profit sum or any adjustment.
/// Technicians whose invoices sum to zero or negative gross profit and
/// who have no adjustments are left off the report.
fn is_eligible(sets: &RecordSets, technician: &Option<String>) -> bool {
    let invoices = sets.invoices_for(technician);
    let adjustments = sets.adjustments_for(technician);

    if invoices.is_empty() && adjustments.is_empty() {
        return false;
    }

    let gp_sum: f64 = invoices.iter().map(|invoice| invoice.gp).sum();
    gp_sum > 0.0 || !adjustments.is_empty()
}

//! Stock ledger operations shared by the compound mutators.

use crate::models::{ClinicState, StockDeduction};

/// Units returned to a medication's stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRestore {
    pub medication_id: String,
    pub quantity: u32,
    pub remaining: u32,
}

/// Deduct `quantity` from a medication, clamping at zero.
///
/// Returns `None` when the medication no longer exists.
pub fn deduct_stock(
    state: &mut ClinicState,
    medication_id: &str,
    quantity: u32,
) -> Option<StockDeduction> {
    let Some(medication) = state.medication_mut(medication_id) else {
        tracing::warn!(medication_id, quantity, "stock deduction for unknown medication skipped");
        return None;
    };

    let deduction = medication.deduct(quantity);
    if deduction.is_clamped() {
        tracing::warn!(
            medication_id,
            requested = deduction.requested,
            applied = deduction.applied,
            "stock clamped at zero; inventory inconsistent"
        );
    }
    Some(deduction)
}

/// Return `quantity` units to a medication.
pub fn restore_stock(
    state: &mut ClinicState,
    medication_id: &str,
    quantity: u32,
) -> Option<StockRestore> {
    let medication = state.medication_mut(medication_id)?;
    medication.restock(quantity);
    Some(StockRestore {
        medication_id: medication_id.to_string(),
        quantity,
        remaining: medication.stock,
    })
}

//! Visit recording and editing.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::stock::{deduct_stock, restore_stock, StockRestore};
use super::{validate_amount, MutationError, MutationResult};
use crate::config::VisitEditPolicy;
use crate::models::{ClinicState, PaymentStatus, PrescribedMed, StockDeduction, Visit};

/// Input to [`submit_visit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisitSubmission {
    pub patient_id: String,
    pub date: Option<NaiveDate>,
    pub diagnosis: String,
    /// Selected symptom labels, stored joined by ", ".
    pub symptoms: Vec<String>,
    pub fee_amount: f64,
    pub payment_status: PaymentStatus,
    /// Vital definition id -> recorded value. Blank values are dropped.
    pub vitals: BTreeMap<String, String>,
    pub prescribed_meds: Vec<PrescribedMed>,
    /// Replace this visit instead of creating a new one.
    pub existing_visit_id: Option<String>,
}

/// What [`submit_visit`] did.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitOutcome {
    pub visit: Visit,
    pub deductions: Vec<StockDeduction>,
    /// Units returned from the replaced prescription (edits only).
    pub restored: Vec<StockRestore>,
    /// Prescribed medication ids that no longer exist; nothing was deducted
    /// for them.
    pub missing_medications: Vec<String>,
}

impl VisitOutcome {
    pub fn shortfalls(&self) -> impl Iterator<Item = &StockDeduction> {
        self.deductions.iter().filter(|d| d.is_clamped())
    }
}

/// Create or replace a visit and deduct its dispensed stock.
pub fn submit_visit(
    state: &mut ClinicState,
    submission: VisitSubmission,
    policy: VisitEditPolicy,
) -> MutationResult<VisitOutcome> {
    if submission.patient_id.trim().is_empty() {
        return Err(MutationError::MissingField("patient"));
    }
    let date = submission.date.ok_or(MutationError::MissingField("date"))?;
    if state.patient(&submission.patient_id).is_none() {
        return Err(MutationError::UnknownPatient(submission.patient_id));
    }
    validate_amount("fee", submission.fee_amount)?;

    let existing = match &submission.existing_visit_id {
        Some(id) => Some(
            state
                .visits
                .iter()
                .position(|v| &v.id == id)
                .ok_or_else(|| MutationError::UnknownVisit(id.clone()))?,
        ),
        None => None,
    };

    let mut restored = Vec::new();
    if let (Some(index), VisitEditPolicy::RestorePrevious) = (existing, policy) {
        let previous: Vec<(String, u32)> = state.visits[index]
            .dispensed_by_medication()
            .into_iter()
            .map(|(id, qty)| (id.to_string(), qty))
            .collect();
        for (medication_id, quantity) in previous {
            if let Some(restore) = restore_stock(state, &medication_id, quantity) {
                restored.push(restore);
            }
        }
    }

    let mut visit = Visit {
        id: submission
            .existing_visit_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        patient_id: submission.patient_id,
        date,
        symptoms: submission.symptoms.join(", "),
        diagnosis: submission.diagnosis,
        prescribed_meds: submission.prescribed_meds,
        vitals: submission
            .vitals
            .into_iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .collect(),
        fee_amount: submission.fee_amount,
        payment_status: submission.payment_status,
    };

    let mut deductions = Vec::new();
    let mut missing_medications = Vec::new();
    for med in &mut visit.prescribed_meds {
        med.dispensed = None;
        let Some(quantity) = med.quantity_to_dispense() else {
            continue;
        };
        match deduct_stock(state, &med.medication_id, quantity) {
            Some(deduction) => {
                med.dispensed = Some(deduction.applied);
                deductions.push(deduction);
            }
            None => {
                med.dispensed = Some(0);
                missing_medications.push(med.medication_id.clone());
            }
        }
    }

    match existing {
        Some(index) => state.visits[index] = visit.clone(),
        None => state.visits.push(visit.clone()),
    }

    Ok(VisitOutcome {
        visit,
        deductions,
        restored,
        missing_medications,
    })
}

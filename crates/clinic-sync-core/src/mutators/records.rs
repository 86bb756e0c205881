//! Single-record mutations: patients, medications, payment status and the
//! reference lists.

use super::{validate_amount, MutationError, MutationResult};
use crate::models::{
    generate_patient_code, ClinicState, Medication, Patient, PaymentStatus, ReferenceItem,
    ReferenceList,
};

/// Register a new patient. A blank id or code is generated.
pub fn register_patient(state: &mut ClinicState, mut patient: Patient) -> MutationResult<Patient> {
    patient.name = patient.name.trim().to_string();
    if patient.name.is_empty() {
        return Err(MutationError::MissingField("name"));
    }
    if patient.id.trim().is_empty() {
        patient.id = uuid::Uuid::new_v4().to_string();
    }
    if state.patient(&patient.id).is_some() {
        return Err(MutationError::Duplicate(patient.id));
    }
    if patient.code.trim().is_empty() {
        patient.code = generate_patient_code();
    }

    state.patients.push(patient.clone());
    Ok(patient)
}

/// Replace an existing patient record, matched by id.
pub fn update_patient(state: &mut ClinicState, mut patient: Patient) -> MutationResult<()> {
    patient.name = patient.name.trim().to_string();
    if patient.name.is_empty() {
        return Err(MutationError::MissingField("name"));
    }
    let slot = state
        .patients
        .iter_mut()
        .find(|p| p.id == patient.id)
        .ok_or_else(|| MutationError::UnknownPatient(patient.id.clone()))?;
    if patient.code.trim().is_empty() {
        patient.code = slot.code.clone();
    }
    *slot = patient;
    Ok(())
}

fn validate_medication(medication: &mut Medication) -> MutationResult<()> {
    medication.brand_name = medication.brand_name.trim().to_string();
    if medication.brand_name.is_empty() {
        return Err(MutationError::MissingField("brand name"));
    }
    validate_amount("price per unit", medication.price_per_unit)
}

/// Add a medication to the catalogue.
pub fn add_medication(
    state: &mut ClinicState,
    mut medication: Medication,
) -> MutationResult<Medication> {
    validate_medication(&mut medication)?;
    if medication.id.trim().is_empty() {
        medication.id = uuid::Uuid::new_v4().to_string();
    }
    if state.medication(&medication.id).is_some() {
        return Err(MutationError::Duplicate(medication.id));
    }

    state.medications.push(medication.clone());
    Ok(medication)
}

/// Replace an existing medication, matched by id.
///
/// Price changes do not affect recorded sales, which keep the price captured
/// at sale time.
pub fn update_medication(
    state: &mut ClinicState,
    mut medication: Medication,
) -> MutationResult<()> {
    validate_medication(&mut medication)?;
    let slot = state
        .medication_mut(&medication.id)
        .ok_or_else(|| MutationError::UnknownMedication(medication.id.clone()))?;
    *slot = medication;
    Ok(())
}

/// Receive `quantity` units into stock. Returns the new stock level.
pub fn restock_medication(
    state: &mut ClinicState,
    medication_id: &str,
    quantity: u32,
) -> MutationResult<u32> {
    if quantity == 0 {
        return Err(MutationError::InvalidQuantity {
            medication_id: medication_id.to_string(),
            quantity,
        });
    }
    let medication = state
        .medication_mut(medication_id)
        .ok_or_else(|| MutationError::UnknownMedication(medication_id.to_string()))?;
    medication.restock(quantity);
    Ok(medication.stock)
}

pub fn set_visit_payment_status(
    state: &mut ClinicState,
    visit_id: &str,
    status: PaymentStatus,
) -> MutationResult<()> {
    let visit = state
        .visits
        .iter_mut()
        .find(|v| v.id == visit_id)
        .ok_or_else(|| MutationError::UnknownVisit(visit_id.to_string()))?;
    visit.payment_status = status;
    Ok(())
}

pub fn set_sale_payment_status(
    state: &mut ClinicState,
    sale_id: &str,
    status: PaymentStatus,
) -> MutationResult<()> {
    let sale = state
        .sales
        .iter_mut()
        .find(|s| s.id == sale_id)
        .ok_or_else(|| MutationError::UnknownSale(sale_id.to_string()))?;
    sale.payment_status = status;
    Ok(())
}

/// Append an entry to a reference list. Labels are unique per list,
/// ignoring case.
pub fn add_reference_item(
    state: &mut ClinicState,
    list: ReferenceList,
    label: &str,
    unit: Option<String>,
) -> MutationResult<ReferenceItem> {
    let label = label.trim();
    if label.is_empty() {
        return Err(MutationError::MissingField("label"));
    }
    let items = state.reference_mut(list);
    if items.iter().any(|i| i.label.eq_ignore_ascii_case(label)) {
        return Err(MutationError::Duplicate(label.to_string()));
    }

    let mut item = ReferenceItem::new(label);
    item.unit = unit
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());
    items.push(item.clone());
    Ok(item)
}

/// Remove an entry from a reference list. Records that already copied the
/// label are unaffected.
pub fn remove_reference_item(
    state: &mut ClinicState,
    list: ReferenceList,
    item_id: &str,
) -> MutationResult<ReferenceItem> {
    let items = state.reference_mut(list);
    let index = items
        .iter()
        .position(|i| i.id == item_id)
        .ok_or_else(|| MutationError::UnknownReferenceItem(item_id.to_string()))?;
    Ok(items.remove(index))
}

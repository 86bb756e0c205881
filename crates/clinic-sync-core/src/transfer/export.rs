//! CSV export of patients, medications and visits.

use super::PATIENT_COLUMNS;
use crate::models::{ClinicState, Visit};

const MEDICATION_COLUMNS: [&str; 10] = [
    "brandName",
    "scientificName",
    "companyName",
    "type",
    "unit",
    "strength",
    "category",
    "stock",
    "reorderLevel",
    "pricePerUnit",
];

const VISIT_COLUMNS: [&str; 9] = [
    "date",
    "patientCode",
    "patientName",
    "symptoms",
    "diagnosis",
    "vitals",
    "prescriptions",
    "feeAmount",
    "paymentStatus",
];

/// Patients in import column order, so an export can be re-imported.
pub fn export_patients_csv(state: &ClinicState) -> String {
    let mut csv = header(&PATIENT_COLUMNS);
    for p in &state.patients {
        push_row(
            &mut csv,
            &[
                p.code.clone(),
                p.name.clone(),
                p.age.to_string(),
                p.gender.clone(),
                p.phone.clone(),
                p.address.clone(),
                p.allergies.clone().unwrap_or_default(),
                p.chronic_conditions.clone().unwrap_or_default(),
            ],
        );
    }
    csv
}

pub fn export_medications_csv(state: &ClinicState) -> String {
    let mut csv = header(&MEDICATION_COLUMNS);
    for m in &state.medications {
        push_row(
            &mut csv,
            &[
                m.brand_name.clone(),
                m.scientific_name.clone(),
                m.company_name.clone(),
                m.med_type.clone(),
                m.unit.clone(),
                m.strength.clone(),
                m.category.clone(),
                m.stock.to_string(),
                m.reorder_level.to_string(),
                m.price_per_unit.to_string(),
            ],
        );
    }
    csv
}

/// Visits with vitals and prescriptions flattened into descriptive strings.
pub fn export_visits_csv(state: &ClinicState) -> String {
    let mut csv = header(&VISIT_COLUMNS);
    for visit in &state.visits {
        let patient = state.patient(&visit.patient_id);
        push_row(
            &mut csv,
            &[
                visit.date.to_string(),
                patient.map(|p| p.code.clone()).unwrap_or_default(),
                patient.map(|p| p.name.clone()).unwrap_or_default(),
                visit.symptoms.clone(),
                visit.diagnosis.clone(),
                describe_vitals(state, visit),
                describe_prescriptions(state, visit),
                visit.fee_amount.to_string(),
                visit.payment_status.to_string(),
            ],
        );
    }
    csv
}

/// "Blood Pressure: 120/80 mmHg; Pulse: 72 bpm"
fn describe_vitals(state: &ClinicState, visit: &Visit) -> String {
    visit
        .vitals
        .iter()
        .map(|(vital_id, value)| {
            let definition = state.vital_definitions.iter().find(|d| &d.id == vital_id);
            let label = definition.map_or(vital_id.as_str(), |d| d.label.as_str());
            match definition.and_then(|d| d.unit.as_deref()) {
                Some(unit) => format!("{}: {} {}", label, value, unit),
                None => format!("{}: {}", label, value),
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// "Amoxil 500mg 3x daily 5 days x15; Panadol 1g"
fn describe_prescriptions(state: &ClinicState, visit: &Visit) -> String {
    visit
        .prescribed_meds
        .iter()
        .map(|med| {
            let quantity = med.quantity.map(|q| format!("x{}", q)).unwrap_or_default();
            [
                state.medication_name(&med.medication_id),
                med.dosage.as_str(),
                med.frequency.as_str(),
                med.duration.as_str(),
                quantity.as_str(),
            ]
            .into_iter()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn header(columns: &[&str]) -> String {
    let mut line = columns.join(",");
    line.push('\n');
    line
}

fn push_row(csv: &mut String, cells: &[String]) {
    let escaped: Vec<String> = cells.iter().map(|c| escape_csv(c)).collect();
    csv.push_str(&escaped.join(","));
    csv.push('\n');
}

fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Medication, Patient, PaymentStatus, PrescribedMed, ReferenceItem};
    use chrono::NaiveDate;

    fn setup_state() -> ClinicState {
        let mut state = ClinicState::default();

        let mut patient = Patient::new("Amina Yusuf".into());
        patient.id = "p1".into();
        patient.code = "P-00AA11".into();
        patient.age = 34;
        patient.address = "12 Zoo Road, Kano".into();
        state.patients.push(patient);

        let mut med = Medication::new("Amoxil".into(), 20, 12.5);
        med.id = "m1".into();
        state.medications.push(med);

        let mut bp = ReferenceItem::with_unit("Blood Pressure", "mmHg");
        bp.id = "bp".into();
        state.vital_definitions.push(bp);

        state.visits.push(Visit {
            id: "v1".into(),
            patient_id: "p1".into(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            symptoms: "Fever, Cough".into(),
            diagnosis: "Chest infection".into(),
            prescribed_meds: vec![
                PrescribedMed {
                    medication_id: "m1".into(),
                    dosage: "500mg".into(),
                    frequency: "3x daily".into(),
                    duration: "5 days".into(),
                    quantity: Some(15),
                    dispensed: Some(15),
                },
                PrescribedMed {
                    medication_id: "gone".into(),
                    dosage: "1g".into(),
                    frequency: String::new(),
                    duration: String::new(),
                    quantity: None,
                    dispensed: None,
                },
            ],
            vitals: [("bp".to_string(), "120/80".to_string())].into(),
            fee_amount: 500.0,
            payment_status: PaymentStatus::Pending,
        });

        state
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_patients_csv_uses_import_columns() {
        let csv = export_patients_csv(&setup_state());
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("code,name,age,gender,phone,address,allergies,chronicConditions")
        );
        assert_eq!(
            lines.next(),
            Some("P-00AA11,Amina Yusuf,34,,,\"12 Zoo Road, Kano\",,")
        );
    }

    #[test]
    fn test_medications_csv() {
        let csv = export_medications_csv(&setup_state());
        assert!(csv.starts_with("brandName,"));
        assert!(csv.contains("Amoxil,,,,,,,20,0,12.5\n"));
    }

    #[test]
    fn test_visits_csv_flattens_details() {
        let csv = export_visits_csv(&setup_state());
        let row = csv.lines().nth(1).unwrap();

        assert!(row.starts_with(
            "2024-05-01,P-00AA11,Amina Yusuf,\"Fever, Cough\",Chest infection,"
        ));
        assert!(row.contains("Blood Pressure: 120/80 mmHg"));
        assert!(row.contains("Amoxil 500mg 3x daily 5 days x15; Unknown 1g"));
        assert!(row.ends_with(",500,Pending"));
    }
}

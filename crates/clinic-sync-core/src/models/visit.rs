//! Clinical visit models.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::payment::PaymentStatus;

/// A medication prescribed during a visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrescribedMed {
    /// Medication id (FK into medications)
    pub medication_id: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub frequency: String,
    #[serde(default)]
    pub duration: String,
    /// Units to dispense from stock. Absent or zero means no deduction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    /// Units actually taken from stock when the visit was saved. Lower than
    /// `quantity` when the deduction clamped at zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispensed: Option<u32>,
}

impl PrescribedMed {
    /// Units to deduct from stock, if any.
    pub fn quantity_to_dispense(&self) -> Option<u32> {
        self.quantity.filter(|q| *q > 0)
    }

    /// Units to give back if this line is withdrawn.
    ///
    /// Records saved before `dispensed` existed fall back to `quantity`.
    pub fn returnable_quantity(&self) -> Option<u32> {
        match self.dispensed {
            Some(dispensed) => Some(dispensed).filter(|q| *q > 0),
            None => self.quantity_to_dispense(),
        }
    }
}

/// A recorded clinical visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub id: String,
    /// Patient id (FK into patients)
    pub patient_id: String,
    /// Calendar date of the visit
    pub date: NaiveDate,
    /// Symptom labels joined by ", "
    #[serde(default)]
    pub symptoms: String,
    #[serde(default)]
    pub diagnosis: String,
    #[serde(default)]
    pub prescribed_meds: Vec<PrescribedMed>,
    /// Vital definition id -> recorded value
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vitals: BTreeMap<String, String>,
    #[serde(default)]
    pub fee_amount: f64,
    #[serde(default)]
    pub payment_status: PaymentStatus,
}

impl Visit {
    /// Total units this visit took from stock per medication id.
    pub fn dispensed_by_medication(&self) -> BTreeMap<&str, u32> {
        let mut totals = BTreeMap::new();
        for med in &self.prescribed_meds {
            if let Some(quantity) = med.returnable_quantity() {
                let total: &mut u32 = totals.entry(med.medication_id.as_str()).or_insert(0);
                *total = total.saturating_add(quantity);
            }
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prescribed(id: &str, quantity: Option<u32>) -> PrescribedMed {
        PrescribedMed {
            medication_id: id.into(),
            dosage: "500mg".into(),
            frequency: "2x daily".into(),
            duration: "5 days".into(),
            quantity,
            dispensed: None,
        }
    }

    fn visit_with(prescribed_meds: Vec<PrescribedMed>) -> Visit {
        Visit {
            id: "v1".into(),
            patient_id: "p1".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            symptoms: String::new(),
            diagnosis: String::new(),
            prescribed_meds,
            vitals: BTreeMap::new(),
            fee_amount: 0.0,
            payment_status: PaymentStatus::Paid,
        }
    }

    #[test]
    fn test_zero_quantity_is_not_dispensed() {
        assert_eq!(prescribed("m1", Some(0)).quantity_to_dispense(), None);
        assert_eq!(prescribed("m1", None).quantity_to_dispense(), None);
        assert_eq!(prescribed("m1", Some(3)).quantity_to_dispense(), Some(3));
    }

    #[test]
    fn test_returnable_prefers_recorded_dispensed() {
        let mut med = prescribed("m1", Some(5));
        assert_eq!(med.returnable_quantity(), Some(5));

        med.dispensed = Some(2);
        assert_eq!(med.returnable_quantity(), Some(2));

        med.dispensed = Some(0);
        assert_eq!(med.returnable_quantity(), None);
    }

    #[test]
    fn test_dispensed_totals_saturate() {
        let visit = visit_with(vec![
            prescribed("m1", Some(u32::MAX)),
            prescribed("m1", Some(u32::MAX)),
        ]);
        assert_eq!(visit.dispensed_by_medication().get("m1"), Some(&u32::MAX));
    }

    #[test]
    fn test_legacy_line_without_dispensed_parses() {
        let json = r#"{"medicationId":"m1","quantity":4}"#;
        let med: PrescribedMed = serde_json::from_str(json).unwrap();
        assert_eq!(med.dispensed, None);
        assert_eq!(med.returnable_quantity(), Some(4));
        assert!(!serde_json::to_string(&med).unwrap().contains("dispensed"));
    }

    #[test]
    fn test_dispensed_by_medication_sums_duplicates() {
        let visit = visit_with(vec![
            prescribed("m1", Some(2)),
            prescribed("m1", Some(3)),
            prescribed("m2", None),
        ]);

        let totals = visit.dispensed_by_medication();
        assert_eq!(totals.get("m1"), Some(&5));
        assert!(!totals.contains_key("m2"));
    }

    #[test]
    fn test_date_serializes_as_iso() {
        let json = r#"{"id":"v1","patientId":"p1","date":"2024-03-01","paymentStatus":"Pending"}"#;
        let visit: Visit = serde_json::from_str(json).unwrap();
        assert_eq!(visit.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(visit.payment_status, PaymentStatus::Pending);
        assert!(visit.prescribed_meds.is_empty());
    }
}

//! The replicated snapshot: every aggregate collection of one replica.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{Medication, Patient, PharmacySale, ReferenceItem, ReferenceList, Visit};

/// Named aggregate collections. The key doubles as the durable-store name
/// and the snapshot payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    Patients,
    Medications,
    Visits,
    Sales,
    Reference(ReferenceList),
}

impl Aggregate {
    pub const ALL: [Aggregate; 11] = [
        Aggregate::Patients,
        Aggregate::Medications,
        Aggregate::Visits,
        Aggregate::Sales,
        Aggregate::Reference(ReferenceList::ScientificNames),
        Aggregate::Reference(ReferenceList::CompanyNames),
        Aggregate::Reference(ReferenceList::MedTypes),
        Aggregate::Reference(ReferenceList::MedCategories),
        Aggregate::Reference(ReferenceList::Symptoms),
        Aggregate::Reference(ReferenceList::VitalDefinitions),
        Aggregate::Reference(ReferenceList::PrescriptionTemplates),
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Aggregate::Patients => "patients",
            Aggregate::Medications => "medications",
            Aggregate::Visits => "visits",
            Aggregate::Sales => "sales",
            Aggregate::Reference(list) => list.key(),
        }
    }
}

/// Full in-memory state of one replica.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClinicState {
    pub patients: Vec<Patient>,
    pub medications: Vec<Medication>,
    pub visits: Vec<Visit>,
    pub sales: Vec<PharmacySale>,
    pub scientific_names: Vec<ReferenceItem>,
    pub company_names: Vec<ReferenceItem>,
    pub med_types: Vec<ReferenceItem>,
    pub med_categories: Vec<ReferenceItem>,
    pub symptoms: Vec<ReferenceItem>,
    pub vital_definitions: Vec<ReferenceItem>,
    pub prescription_templates: Vec<ReferenceItem>,
}

/// A (possibly partial) map of aggregate name to full collection.
///
/// Absent fields are left untouched on the receiving side; present fields
/// replace the local collection wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patients: Option<Vec<Patient>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medications: Option<Vec<Medication>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visits: Option<Vec<Visit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sales: Option<Vec<PharmacySale>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scientific_names: Option<Vec<ReferenceItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_names: Option<Vec<ReferenceItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub med_types: Option<Vec<ReferenceItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub med_categories: Option<Vec<ReferenceItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symptoms: Option<Vec<ReferenceItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vital_definitions: Option<Vec<ReferenceItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescription_templates: Option<Vec<ReferenceItem>>,
}

impl SnapshotPayload {
    /// Aggregates carried by this payload.
    pub fn keys(&self) -> Vec<Aggregate> {
        let present = [
            self.patients.is_some(),
            self.medications.is_some(),
            self.visits.is_some(),
            self.sales.is_some(),
            self.scientific_names.is_some(),
            self.company_names.is_some(),
            self.med_types.is_some(),
            self.med_categories.is_some(),
            self.symptoms.is_some(),
            self.vital_definitions.is_some(),
            self.prescription_templates.is_some(),
        ];
        Aggregate::ALL
            .into_iter()
            .zip(present)
            .filter_map(|(aggregate, present)| present.then_some(aggregate))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }
}

impl ClinicState {
    /// Empty domain collections with the default reference lists.
    pub fn seeded() -> Self {
        Self {
            med_types: labels(&["Tablet", "Capsule", "Syrup", "Injection", "Cream", "Drops"]),
            med_categories: labels(&[
                "Analgesic",
                "Antibiotic",
                "Antihypertensive",
                "Antidiabetic",
                "Vitamin",
            ]),
            symptoms: labels(&["Fever", "Cough", "Headache", "Fatigue", "Nausea", "Chest pain"]),
            vital_definitions: vec![
                ReferenceItem::with_unit("Blood Pressure", "mmHg"),
                ReferenceItem::with_unit("Temperature", "°C"),
                ReferenceItem::with_unit("Pulse", "bpm"),
                ReferenceItem::with_unit("Weight", "kg"),
                ReferenceItem::with_unit("Blood Sugar", "mg/dL"),
            ],
            ..Self::default()
        }
    }

    /// Complete snapshot carrying every aggregate.
    pub fn to_payload(&self) -> SnapshotPayload {
        SnapshotPayload {
            patients: Some(self.patients.clone()),
            medications: Some(self.medications.clone()),
            visits: Some(self.visits.clone()),
            sales: Some(self.sales.clone()),
            scientific_names: Some(self.scientific_names.clone()),
            company_names: Some(self.company_names.clone()),
            med_types: Some(self.med_types.clone()),
            med_categories: Some(self.med_categories.clone()),
            symptoms: Some(self.symptoms.clone()),
            vital_definitions: Some(self.vital_definitions.clone()),
            prescription_templates: Some(self.prescription_templates.clone()),
        }
    }

    /// Replace every collection present in `payload`. Returns the keys applied.
    pub fn apply_payload(&mut self, payload: SnapshotPayload) -> Vec<Aggregate> {
        let applied = payload.keys();
        let SnapshotPayload {
            patients,
            medications,
            visits,
            sales,
            scientific_names,
            company_names,
            med_types,
            med_categories,
            symptoms,
            vital_definitions,
            prescription_templates,
        } = payload;

        replace(&mut self.patients, patients);
        replace(&mut self.medications, medications);
        replace(&mut self.visits, visits);
        replace(&mut self.sales, sales);
        replace(&mut self.scientific_names, scientific_names);
        replace(&mut self.company_names, company_names);
        replace(&mut self.med_types, med_types);
        replace(&mut self.med_categories, med_categories);
        replace(&mut self.symptoms, symptoms);
        replace(&mut self.vital_definitions, vital_definitions);
        replace(&mut self.prescription_templates, prescription_templates);

        applied
    }

    pub fn reference(&self, list: ReferenceList) -> &[ReferenceItem] {
        match list {
            ReferenceList::ScientificNames => &self.scientific_names,
            ReferenceList::CompanyNames => &self.company_names,
            ReferenceList::MedTypes => &self.med_types,
            ReferenceList::MedCategories => &self.med_categories,
            ReferenceList::Symptoms => &self.symptoms,
            ReferenceList::VitalDefinitions => &self.vital_definitions,
            ReferenceList::PrescriptionTemplates => &self.prescription_templates,
        }
    }

    pub fn reference_mut(&mut self, list: ReferenceList) -> &mut Vec<ReferenceItem> {
        match list {
            ReferenceList::ScientificNames => &mut self.scientific_names,
            ReferenceList::CompanyNames => &mut self.company_names,
            ReferenceList::MedTypes => &mut self.med_types,
            ReferenceList::MedCategories => &mut self.med_categories,
            ReferenceList::Symptoms => &mut self.symptoms,
            ReferenceList::VitalDefinitions => &mut self.vital_definitions,
            ReferenceList::PrescriptionTemplates => &mut self.prescription_templates,
        }
    }

    pub fn patient(&self, id: &str) -> Option<&Patient> {
        self.patients.iter().find(|p| p.id == id)
    }

    pub fn medication(&self, id: &str) -> Option<&Medication> {
        self.medications.iter().find(|m| m.id == id)
    }

    pub fn medication_mut(&mut self, id: &str) -> Option<&mut Medication> {
        self.medications.iter_mut().find(|m| m.id == id)
    }

    /// Brand name of a medication, or "Unknown" if it no longer exists.
    pub fn medication_name(&self, id: &str) -> &str {
        self.medication(id)
            .map(|m| m.brand_name.as_str())
            .unwrap_or(UNKNOWN_LABEL)
    }

    /// SHA-256 (hex) over the canonical JSON of the full snapshot.
    ///
    /// Two replicas holding equal state produce equal fingerprints.
    pub fn fingerprint(&self) -> serde_json::Result<String> {
        let json = serde_json::to_vec(&self.to_payload())?;
        Ok(hex::encode(Sha256::digest(&json)))
    }
}

/// Label shown for references that no longer resolve.
pub const UNKNOWN_LABEL: &str = "Unknown";

fn replace<T>(slot: &mut Vec<T>, incoming: Option<Vec<T>>) {
    if let Some(collection) = incoming {
        *slot = collection;
    }
}

fn labels(values: &[&str]) -> Vec<ReferenceItem> {
    values.iter().map(|v| ReferenceItem::new(*v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_partial_payload_leaves_absent_keys() {
        let mut state = ClinicState::seeded();
        state.patients.push(Patient::new("Amina".into()));
        let symptoms_before = state.symptoms.clone();

        let payload = SnapshotPayload {
            medications: Some(vec![Medication::new("Panadol".into(), 10, 50.0)]),
            ..SnapshotPayload::default()
        };
        let applied = state.apply_payload(payload);

        assert_eq!(applied, vec![Aggregate::Medications]);
        assert_eq!(state.medications.len(), 1);
        assert_eq!(state.patients.len(), 1);
        assert_eq!(state.symptoms, symptoms_before);
    }

    #[test]
    fn test_apply_replaces_whole_collection() {
        let mut state = ClinicState::default();
        state.patients.push(Patient::new("Amina".into()));
        state.patients.push(Patient::new("Bilal".into()));

        let incoming = vec![Patient::new("Chidi".into())];
        state.apply_payload(SnapshotPayload {
            patients: Some(incoming.clone()),
            ..SnapshotPayload::default()
        });

        assert_eq!(state.patients, incoming);
    }

    #[test]
    fn test_payload_omits_absent_keys_on_wire() {
        let payload = SnapshotPayload {
            sales: Some(Vec::new()),
            ..SnapshotPayload::default()
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"sales":[]}"#);
    }

    #[test]
    fn test_full_payload_has_every_key() {
        let payload = ClinicState::seeded().to_payload();
        assert_eq!(payload.keys().len(), Aggregate::ALL.len());

        let json = serde_json::to_value(&payload).unwrap();
        for aggregate in Aggregate::ALL {
            assert!(json.get(aggregate.key()).is_some(), "missing {}", aggregate.key());
        }
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let state = ClinicState::seeded();
        let copy = state.clone();
        assert_eq!(state.fingerprint().unwrap(), copy.fingerprint().unwrap());

        let mut changed = state.clone();
        changed.patients.push(Patient::new("Amina".into()));
        assert_ne!(state.fingerprint().unwrap(), changed.fingerprint().unwrap());
    }

    #[test]
    fn test_fingerprint_hashes_snapshot_not_empty_input() {
        let empty = hex::encode(Sha256::digest(b""));
        let fingerprint = ClinicState::default().fingerprint().unwrap();
        assert_eq!(fingerprint.len(), 64);
        assert_ne!(fingerprint, empty);
    }

    #[test]
    fn test_medication_name_unknown_on_miss() {
        let mut state = ClinicState::default();
        let med = Medication::new("Panadol".into(), 1, 1.0);
        let id = med.id.clone();
        state.medications.push(med);

        assert_eq!(state.medication_name(&id), "Panadol");
        assert_eq!(state.medication_name("gone"), UNKNOWN_LABEL);
    }
}

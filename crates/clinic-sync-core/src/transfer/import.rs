//! Patient import preview.

use super::{ImportError, ImportResult};
use crate::models::{generate_patient_code, Patient};

/// Patients parsed from an import table, awaiting operator confirmation.
///
/// Nothing is written until the preview is handed to
/// [`Replica::import_patients`](crate::replica::Replica::import_patients),
/// which replaces the whole patient collection.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientImport {
    patients: Vec<Patient>,
    skipped_rows: usize,
}

impl PatientImport {
    /// Build a preview from a header row followed by data rows in
    /// [`PATIENT_COLUMNS`](super::PATIENT_COLUMNS) order.
    ///
    /// Missing cells read as empty, an unparsable age reads as 0 and a blank
    /// code is generated. Rows with no content are skipped.
    pub fn from_rows(rows: &[Vec<String>]) -> ImportResult<Self> {
        let mut patients = Vec::new();
        let mut skipped_rows = 0;

        for row in rows.iter().skip(1) {
            if row.iter().all(|cell| cell.trim().is_empty()) {
                skipped_rows += 1;
                continue;
            }
            patients.push(parse_row(row));
        }

        if patients.is_empty() {
            return Err(ImportError::Empty);
        }

        tracing::debug!(rows = patients.len(), skipped_rows, "parsed patient import");
        Ok(Self {
            patients,
            skipped_rows,
        })
    }

    pub fn patients(&self) -> &[Patient] {
        &self.patients
    }

    pub fn into_patients(self) -> Vec<Patient> {
        self.patients
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    /// Blank rows ignored while parsing.
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }
}

fn parse_row(row: &[String]) -> Patient {
    let cell = |i: usize| row.get(i).map(|c| c.trim()).unwrap_or_default();
    let optional = |i: usize| Some(cell(i)).filter(|c| !c.is_empty()).map(str::to_string);

    let code = match cell(0) {
        "" => generate_patient_code(),
        code => code.to_string(),
    };

    Patient {
        id: uuid::Uuid::new_v4().to_string(),
        code,
        name: cell(1).to_string(),
        age: cell(2).parse().unwrap_or(0),
        gender: cell(3).to_string(),
        phone: cell(4).to_string(),
        address: cell(5).to_string(),
        allergies: optional(6),
        chronic_conditions: optional(7),
    }
}

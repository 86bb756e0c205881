//! Patient models.

use serde::{Deserialize, Serialize};

/// A registered patient.
///
/// `id` is the opaque local identifier; `code` is the human-readable display
/// key printed on cards and receipts. Codes are not enforced unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    /// Local UUID - always present, generated locally
    pub id: String,
    /// Display code (e.g., "P-3F9A2C")
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub age: u32,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    /// Free-text allergy notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allergies: Option<String>,
    /// Free-text chronic conditions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chronic_conditions: Option<String>,
}

impl Patient {
    /// Create a new patient with a fresh id and a generated code.
    pub fn new(name: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            code: generate_patient_code(),
            name,
            age: 0,
            gender: String::new(),
            phone: String::new(),
            address: String::new(),
            allergies: None,
            chronic_conditions: None,
        }
    }

    /// Whether any allergy text has been recorded.
    pub fn has_allergies(&self) -> bool {
        self.allergies
            .as_deref()
            .is_some_and(|a| !a.trim().is_empty())
    }
}

/// Generate a placeholder display code of the form `P-XXXXXX`.
pub fn generate_patient_code() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("P-{}", id[..6].to_uppercase())
}

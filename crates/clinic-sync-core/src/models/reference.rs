//! Reference lookup lists managed from the settings screens.

use serde::{Deserialize, Serialize};

/// An entry in one of the reference lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceItem {
    pub id: String,
    pub label: String,
    /// Measurement unit (vital definitions only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl ReferenceItem {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.into(),
            unit: None,
        }
    }

    pub fn with_unit(label: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            unit: Some(unit.into()),
            ..Self::new(label)
        }
    }
}

/// The reference lists, each stored as its own aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceList {
    ScientificNames,
    CompanyNames,
    MedTypes,
    MedCategories,
    Symptoms,
    VitalDefinitions,
    PrescriptionTemplates,
}

impl ReferenceList {
    pub const ALL: [ReferenceList; 7] = [
        ReferenceList::ScientificNames,
        ReferenceList::CompanyNames,
        ReferenceList::MedTypes,
        ReferenceList::MedCategories,
        ReferenceList::Symptoms,
        ReferenceList::VitalDefinitions,
        ReferenceList::PrescriptionTemplates,
    ];

    /// Parse from the aggregate key (e.g., "medTypes").
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|list| list.key() == key)
    }

    pub fn key(&self) -> &'static str {
        match self {
            ReferenceList::ScientificNames => "scientificNames",
            ReferenceList::CompanyNames => "companyNames",
            ReferenceList::MedTypes => "medTypes",
            ReferenceList::MedCategories => "medCategories",
            ReferenceList::Symptoms => "symptoms",
            ReferenceList::VitalDefinitions => "vitalDefinitions",
            ReferenceList::PrescriptionTemplates => "prescriptionTemplates",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip() {
        for list in ReferenceList::ALL {
            assert_eq!(ReferenceList::from_key(list.key()), Some(list));
        }
        assert_eq!(ReferenceList::from_key("patients"), None);
    }

    #[test]
    fn test_unit_omitted_when_absent() {
        let json = serde_json::to_string(&ReferenceItem::new("Cough")).unwrap();
        assert!(!json.contains("unit"));

        let json = serde_json::to_string(&ReferenceItem::with_unit("Temperature", "°C")).unwrap();
        assert!(json.contains("\"unit\":\"°C\""));
    }
}

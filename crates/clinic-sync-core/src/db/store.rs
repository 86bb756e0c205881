//! Namespaced key/value store for aggregate collections.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Database, DbResult};
use crate::models::{Aggregate, ClinicState, ReferenceList};

const LAST_REMOTE_SYNC: &str = "last_remote_sync";

/// Durable store for one installation.
///
/// Values are JSON documents keyed by `namespace + name`. Unparsable values
/// are treated as absent so a corrupted store never blocks startup.
pub struct DurableStore {
    db: Database,
    namespace: String,
}

impl DurableStore {
    pub fn new(db: Database, namespace: impl Into<String>) -> Self {
        Self {
            db,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.namespace, name)
    }

    /// Raw stored JSON for `name`, if any.
    pub fn load_raw(&self, name: &str) -> DbResult<Option<String>> {
        self.db
            .conn()
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?",
                [self.key(name)],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Load `name`, returning `fallback` when absent or unparsable.
    pub fn load<T: DeserializeOwned>(&self, name: &str, fallback: T) -> T {
        let raw = match self.load_raw(name) {
            Ok(Some(raw)) => raw,
            Ok(None) => return fallback,
            Err(e) => {
                tracing::warn!(name, error = %e, "durable store read failed, using fallback");
                return fallback;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(name, error = %e, "stored value unparsable, using fallback");
                fallback
            }
        }
    }

    /// Serialize and write `value` under `name`, replacing any prior value.
    pub fn save<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> DbResult<()> {
        let json = serde_json::to_string(value)?;
        self.db.conn().execute(
            r#"
            INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![self.key(name), json],
        )?;
        Ok(())
    }

    /// Write every aggregate collection in one transaction.
    pub fn save_state(&mut self, state: &ClinicState) -> DbResult<()> {
        let mut documents = Vec::with_capacity(Aggregate::ALL.len());
        for aggregate in Aggregate::ALL {
            documents.push((self.key(aggregate.key()), aggregate_json(state, aggregate)?));
        }

        let tx = self.db.transaction()?;
        for (key, json) in &documents {
            tx.execute(
                r#"
                INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                "#,
                params![key, json],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Load every aggregate, falling back per collection.
    ///
    /// Reference lists fall back to the seeded defaults; everything else to
    /// an empty collection.
    pub fn load_state(&self) -> ClinicState {
        let seeded = ClinicState::seeded();
        ClinicState {
            patients: self.load(Aggregate::Patients.key(), Vec::new()),
            medications: self.load(Aggregate::Medications.key(), Vec::new()),
            visits: self.load(Aggregate::Visits.key(), Vec::new()),
            sales: self.load(Aggregate::Sales.key(), Vec::new()),
            scientific_names: self.load(
                ReferenceList::ScientificNames.key(),
                seeded.scientific_names,
            ),
            company_names: self.load(ReferenceList::CompanyNames.key(), seeded.company_names),
            med_types: self.load(ReferenceList::MedTypes.key(), seeded.med_types),
            med_categories: self.load(ReferenceList::MedCategories.key(), seeded.med_categories),
            symptoms: self.load(ReferenceList::Symptoms.key(), seeded.symptoms),
            vital_definitions: self.load(
                ReferenceList::VitalDefinitions.key(),
                seeded.vital_definitions,
            ),
            prescription_templates: self.load(
                ReferenceList::PrescriptionTemplates.key(),
                seeded.prescription_templates,
            ),
        }
    }

    /// When a remote snapshot was last applied.
    pub fn last_remote_sync(&self) -> DbResult<Option<DateTime<Utc>>> {
        let value = self.db.get_sync_state(LAST_REMOTE_SYNC)?;
        Ok(value
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    pub fn set_last_remote_sync(&self, at: DateTime<Utc>) -> DbResult<()> {
        self.db.set_sync_state(LAST_REMOTE_SYNC, &at.to_rfc3339())
    }
}

fn aggregate_json(state: &ClinicState, aggregate: Aggregate) -> serde_json::Result<String> {
    match aggregate {
        Aggregate::Patients => serde_json::to_string(&state.patients),
        Aggregate::Medications => serde_json::to_string(&state.medications),
        Aggregate::Visits => serde_json::to_string(&state.visits),
        Aggregate::Sales => serde_json::to_string(&state.sales),
        Aggregate::Reference(list) => serde_json::to_string(state.reference(list)),
    }
}

//! Clinic Sync Core Library
//!
//! Multi-replica state synchronization and transactional mutations for a
//! local-first clinic management tool.
//!
//! # Architecture
//!
//! ```text
//!   UI call ──▶ Replica::mutate ──▶ Mutator (on a working copy)
//!                                        │
//!                               [REJECT: no effects]
//!                                        │
//!                     DurableStore::save_state (one transaction)
//!                                        │
//!                            adopt copy, observe Local
//!                                        │
//!                          ┌─────────────┴─────────────┐
//!                          │ Idle           ApplyingRemote
//!                          ▼                           ▼
//!                 publish SYNC_ALL           defer until release
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!       Replica B      Replica C      Replica D
//!   (inbox → apply, guard window, never re-broadcast)
//! ```
//!
//! # Core Principle
//!
//! **A replica never broadcasts data it received from another replica
//! without an intervening genuine local edit.**
//!
//! # Modules
//!
//! - [`db`]: SQLite-backed durable store
//! - [`models`]: Domain aggregates (Patient, Medication, Visit, PharmacySale)
//! - [`mutators`]: Validated, atomic state transitions
//! - [`sync`]: Replication channel and echo-suppression coordinator
//! - [`replica`]: State owner tying the above together
//! - [`transfer`]: Patient import and CSV export

pub mod config;
pub mod db;
pub mod models;
pub mod mutators;
pub mod replica;
pub mod sync;
pub mod transfer;

// Re-export commonly used types
pub use config::{ClinicConfig, VisitEditPolicy};
pub use db::{Database, DurableStore};
pub use models::{
    ClinicState, Medication, Patient, PaymentStatus, PharmacySale, PharmacySaleItem,
    PrescribedMed, ReferenceItem, ReferenceList, SnapshotPayload, Visit,
};
pub use mutators::{Cart, CartLine, MutationError, SaleReceipt, VisitOutcome, VisitSubmission};
pub use replica::{Replica, ReplicaError};
pub use sync::{BroadcastHub, ReplicationChannel, SyncCoordinator, SyncMessage, SyncPhase};
pub use transfer::{PatientImport, PATIENT_COLUMNS};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Sync error: {0}")]
    SyncError(String),
}

impl From<db::DbError> for ClinicError {
    fn from(e: db::DbError) -> Self {
        ClinicError::StorageError(e.to_string())
    }
}

impl From<serde_json::Error> for ClinicError {
    fn from(e: serde_json::Error) -> Self {
        ClinicError::SerializationError(e.to_string())
    }
}

impl From<sync::SyncError> for ClinicError {
    fn from(e: sync::SyncError) -> Self {
        ClinicError::SyncError(e.to_string())
    }
}

impl From<MutationError> for ClinicError {
    fn from(e: MutationError) -> Self {
        match e {
            MutationError::UnknownMedication(_)
            | MutationError::UnknownPatient(_)
            | MutationError::UnknownVisit(_)
            | MutationError::UnknownSale(_)
            | MutationError::UnknownReferenceItem(_) => ClinicError::NotFound(e.to_string()),
            _ => ClinicError::InvalidInput(e.to_string()),
        }
    }
}

impl From<ReplicaError> for ClinicError {
    fn from(e: ReplicaError) -> Self {
        match e {
            ReplicaError::Storage(e) => e.into(),
            ReplicaError::Sync(e) => e.into(),
            ReplicaError::Rejected(e) => e.into(),
            ReplicaError::Serialization(e) => e.into(),
        }
    }
}

impl From<transfer::ImportError> for ClinicError {
    fn from(e: transfer::ImportError) -> Self {
        ClinicError::InvalidInput(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicError::StorageError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

fn parse_config(config_json: Option<String>) -> Result<ClinicConfig, ClinicError> {
    match config_json {
        Some(json) => Ok(ClinicConfig::from_json(&json)?),
        None => Ok(ClinicConfig::default()),
    }
}

fn open_core(db: Database, config: ClinicConfig) -> Result<Arc<ClinicCore>, ClinicError> {
    let channel = BroadcastHub::global().open(config.channel_name.clone())?;
    let replica = Replica::open(db, Box::new(channel), config)?;
    Ok(Arc::new(ClinicCore {
        replica: Mutex::new(replica),
        cart: Mutex::new(Cart::new()),
        pending_import: Mutex::new(None),
    }))
}

/// Open a replica backed by the database at `path`, creating it if needed.
///
/// Every replica of one installation should open the same file.
#[uniffi::export]
pub fn open_replica(
    path: String,
    config_json: Option<String>,
) -> Result<Arc<ClinicCore>, ClinicError> {
    let config = parse_config(config_json)?;
    open_core(Database::open(&path)?, config)
}

/// Open a replica with an in-memory database (for testing).
#[uniffi::export]
pub fn open_replica_in_memory(
    config_json: Option<String>,
) -> Result<Arc<ClinicCore>, ClinicError> {
    let config = parse_config(config_json)?;
    open_core(Database::open_in_memory()?, config)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe replica wrapper for FFI.
///
/// Holds the operator's pharmacy cart and any import awaiting confirmation.
#[derive(uniffi::Object)]
pub struct ClinicCore {
    replica: Mutex<Replica>,
    cart: Mutex<Cart>,
    pending_import: Mutex<Option<PatientImport>>,
}

fn parse_list(key: &str) -> Result<ReferenceList, ClinicError> {
    ReferenceList::from_key(key)
        .ok_or_else(|| ClinicError::InvalidInput(format!("Unknown reference list: {}", key)))
}

#[uniffi::export]
impl ClinicCore {
    // =========================================================================
    // Sync Operations
    // =========================================================================

    /// Drive the sync timer; call periodically from the host event loop.
    pub fn tick(&self) -> Result<bool, ClinicError> {
        let mut replica = self.replica.lock()?;
        Ok(replica.tick())
    }

    /// Apply snapshots received from other replicas.
    pub fn process_inbound(&self) -> Result<u32, ClinicError> {
        let mut replica = self.replica.lock()?;
        Ok(replica.process_inbound() as u32)
    }

    /// Apply a wire message delivered by the host. Returns the aggregate
    /// keys replaced.
    pub fn receive_raw(&self, json: String) -> Result<Vec<String>, ClinicError> {
        let mut replica = self.replica.lock()?;
        let applied = replica.receive_raw(&json)?;
        Ok(applied.iter().map(|a| a.key().to_string()).collect())
    }

    pub fn fingerprint(&self) -> Result<String, ClinicError> {
        Ok(self.replica.lock()?.fingerprint()?)
    }

    /// RFC 3339 time of the last applied remote snapshot.
    pub fn last_synced_at(&self) -> Result<Option<String>, ClinicError> {
        Ok(self.replica.lock()?.last_synced_at().map(|t| t.to_rfc3339()))
    }

    pub fn is_applying_remote(&self) -> Result<bool, ClinicError> {
        Ok(matches!(
            self.replica.lock()?.sync_phase(),
            SyncPhase::ApplyingRemote { .. }
        ))
    }

    pub fn suppressed_echoes(&self) -> Result<u64, ClinicError> {
        Ok(self.replica.lock()?.suppressed_echoes())
    }

    // =========================================================================
    // Patient Operations
    // =========================================================================

    pub fn register_patient(&self, patient: FfiPatient) -> Result<FfiPatient, ClinicError> {
        let mut replica = self.replica.lock()?;
        Ok(replica.register_patient(patient.into())?.into())
    }

    pub fn update_patient(&self, patient: FfiPatient) -> Result<(), ClinicError> {
        let mut replica = self.replica.lock()?;
        Ok(replica.update_patient(patient.into())?)
    }

    pub fn get_patient(&self, id: String) -> Result<Option<FfiPatient>, ClinicError> {
        let replica = self.replica.lock()?;
        Ok(replica.patient(&id).cloned().map(Into::into))
    }

    pub fn list_patients(&self) -> Result<Vec<FfiPatient>, ClinicError> {
        let replica = self.replica.lock()?;
        Ok(replica.patients().iter().cloned().map(Into::into).collect())
    }

    // =========================================================================
    // Medication Operations
    // =========================================================================

    pub fn add_medication(&self, medication: FfiMedication) -> Result<FfiMedication, ClinicError> {
        let mut replica = self.replica.lock()?;
        Ok(replica.add_medication(medication.into())?.into())
    }

    pub fn update_medication(&self, medication: FfiMedication) -> Result<(), ClinicError> {
        let mut replica = self.replica.lock()?;
        Ok(replica.update_medication(medication.into())?)
    }

    /// Receive stock. Returns the new stock level.
    pub fn restock_medication(&self, id: String, quantity: u32) -> Result<u32, ClinicError> {
        let mut replica = self.replica.lock()?;
        Ok(replica.restock_medication(&id, quantity)?)
    }

    pub fn list_medications(&self) -> Result<Vec<FfiMedication>, ClinicError> {
        let replica = self.replica.lock()?;
        Ok(replica.medications().iter().cloned().map(Into::into).collect())
    }

    pub fn low_stock_medications(&self) -> Result<Vec<FfiMedication>, ClinicError> {
        let replica = self.replica.lock()?;
        Ok(replica
            .low_stock_medications()
            .into_iter()
            .cloned()
            .map(Into::into)
            .collect())
    }

    /// Brand name, or "Unknown".
    pub fn medication_name(&self, id: String) -> Result<String, ClinicError> {
        Ok(self.replica.lock()?.medication_name(&id).to_string())
    }

    // =========================================================================
    // Cart & Sale Operations
    // =========================================================================

    pub fn cart_add(&self, medication_id: String, quantity: u32) -> Result<u32, ClinicError> {
        let replica = self.replica.lock()?;
        let mut cart = self.cart.lock()?;
        Ok(replica.add_to_cart(&mut cart, &medication_id, quantity)?)
    }

    pub fn cart_set_quantity(
        &self,
        medication_id: String,
        quantity: u32,
    ) -> Result<(), ClinicError> {
        let replica = self.replica.lock()?;
        let mut cart = self.cart.lock()?;
        Ok(replica.set_cart_quantity(&mut cart, &medication_id, quantity)?)
    }

    pub fn cart_remove(&self, medication_id: String) -> Result<bool, ClinicError> {
        Ok(self.cart.lock()?.remove(&medication_id))
    }

    pub fn cart_clear(&self) -> Result<(), ClinicError> {
        self.cart.lock()?.clear();
        Ok(())
    }

    pub fn cart_lines(&self) -> Result<Vec<FfiCartLine>, ClinicError> {
        let cart = self.cart.lock()?;
        Ok(cart.lines().iter().cloned().map(Into::into).collect())
    }

    pub fn cart_total(&self) -> Result<f64, ClinicError> {
        let replica = self.replica.lock()?;
        let cart = self.cart.lock()?;
        Ok(replica.cart_total(&cart))
    }

    /// Sell the cart. The cart is cleared only on success.
    pub fn complete_sale(
        &self,
        customer_name: Option<String>,
        payment_status: FfiPaymentStatus,
    ) -> Result<FfiSaleReceipt, ClinicError> {
        let mut replica = self.replica.lock()?;
        let mut cart = self.cart.lock()?;
        let receipt =
            replica.complete_sale(&mut cart, customer_name.as_deref(), payment_status.into())?;
        Ok(receipt.into())
    }

    pub fn set_sale_payment_status(
        &self,
        sale_id: String,
        status: FfiPaymentStatus,
    ) -> Result<(), ClinicError> {
        let mut replica = self.replica.lock()?;
        Ok(replica.set_sale_payment_status(&sale_id, status.into())?)
    }

    pub fn list_sales(&self) -> Result<Vec<FfiSale>, ClinicError> {
        let replica = self.replica.lock()?;
        Ok(replica.sales().iter().cloned().map(Into::into).collect())
    }

    // =========================================================================
    // Visit Operations
    // =========================================================================

    pub fn submit_visit(
        &self,
        submission: FfiVisitSubmission,
    ) -> Result<FfiVisitOutcome, ClinicError> {
        let submission = submission.try_into()?;
        let mut replica = self.replica.lock()?;
        Ok(replica.submit_visit(submission)?.into())
    }

    pub fn set_visit_payment_status(
        &self,
        visit_id: String,
        status: FfiPaymentStatus,
    ) -> Result<(), ClinicError> {
        let mut replica = self.replica.lock()?;
        Ok(replica.set_visit_payment_status(&visit_id, status.into())?)
    }

    /// All visits, or one patient's visits newest first.
    pub fn list_visits(&self, patient_id: Option<String>) -> Result<Vec<FfiVisit>, ClinicError> {
        let replica = self.replica.lock()?;
        let visits: Vec<Visit> = match patient_id {
            Some(id) => replica.visits_for_patient(&id).into_iter().cloned().collect(),
            None => replica.visits().to_vec(),
        };
        Ok(visits.into_iter().map(Into::into).collect())
    }

    // =========================================================================
    // Reference Lists
    // =========================================================================

    /// Items of a reference list, by aggregate key (e.g., "symptoms").
    pub fn reference_items(&self, list: String) -> Result<Vec<FfiReferenceItem>, ClinicError> {
        let list = parse_list(&list)?;
        let replica = self.replica.lock()?;
        Ok(replica.reference(list).iter().cloned().map(Into::into).collect())
    }

    pub fn add_reference_item(
        &self,
        list: String,
        label: String,
        unit: Option<String>,
    ) -> Result<FfiReferenceItem, ClinicError> {
        let list = parse_list(&list)?;
        let mut replica = self.replica.lock()?;
        Ok(replica.add_reference_item(list, &label, unit)?.into())
    }

    pub fn remove_reference_item(&self, list: String, item_id: String) -> Result<(), ClinicError> {
        let list = parse_list(&list)?;
        let mut replica = self.replica.lock()?;
        replica.remove_reference_item(list, &item_id)?;
        Ok(())
    }

    // =========================================================================
    // Import / Export Operations
    // =========================================================================

    /// Parse an import table and hold it until confirmed.
    pub fn preview_patient_import(
        &self,
        rows: Vec<Vec<String>>,
    ) -> Result<Vec<FfiPatient>, ClinicError> {
        let preview = PatientImport::from_rows(&rows)?;
        let patients = preview.patients().iter().cloned().map(Into::into).collect();
        *self.pending_import.lock()? = Some(preview);
        Ok(patients)
    }

    /// Replace all patients with the previewed import.
    pub fn confirm_patient_import(&self) -> Result<u32, ClinicError> {
        let preview = self
            .pending_import
            .lock()?
            .take()
            .ok_or_else(|| ClinicError::InvalidInput("No import awaiting confirmation".into()))?;
        let mut replica = self.replica.lock()?;
        Ok(replica.import_patients(preview)? as u32)
    }

    pub fn cancel_patient_import(&self) -> Result<(), ClinicError> {
        self.pending_import.lock()?.take();
        Ok(())
    }

    pub fn export_patients_csv(&self) -> Result<String, ClinicError> {
        Ok(transfer::export_patients_csv(self.replica.lock()?.state()))
    }

    pub fn export_medications_csv(&self) -> Result<String, ClinicError> {
        Ok(transfer::export_medications_csv(self.replica.lock()?.state()))
    }

    pub fn export_visits_csv(&self) -> Result<String, ClinicError> {
        Ok(transfer::export_visits_csv(self.replica.lock()?.state()))
    }
}

// =========================================================================
// FFI Types
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiPaymentStatus {
    Paid,
    Pending,
}

impl From<FfiPaymentStatus> for PaymentStatus {
    fn from(status: FfiPaymentStatus) -> Self {
        match status {
            FfiPaymentStatus::Paid => PaymentStatus::Paid,
            FfiPaymentStatus::Pending => PaymentStatus::Pending,
        }
    }
}

impl From<PaymentStatus> for FfiPaymentStatus {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Paid => FfiPaymentStatus::Paid,
            PaymentStatus::Pending => FfiPaymentStatus::Pending,
        }
    }
}

/// FFI-safe patient. Leave `id` and `code` empty to have them generated.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: String,
    pub code: String,
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub phone: String,
    pub address: String,
    pub allergies: Option<String>,
    pub chronic_conditions: Option<String>,
}

impl From<Patient> for FfiPatient {
    fn from(p: Patient) -> Self {
        Self {
            id: p.id,
            code: p.code,
            name: p.name,
            age: p.age,
            gender: p.gender,
            phone: p.phone,
            address: p.address,
            allergies: p.allergies,
            chronic_conditions: p.chronic_conditions,
        }
    }
}

impl From<FfiPatient> for Patient {
    fn from(p: FfiPatient) -> Self {
        Patient {
            id: p.id,
            code: p.code,
            name: p.name,
            age: p.age,
            gender: p.gender,
            phone: p.phone,
            address: p.address,
            allergies: p.allergies.filter(|a| !a.trim().is_empty()),
            chronic_conditions: p.chronic_conditions.filter(|c| !c.trim().is_empty()),
        }
    }
}

/// FFI-safe medication. Leave `id` empty to have it generated.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMedication {
    pub id: String,
    pub brand_name: String,
    pub scientific_name: String,
    pub company_name: String,
    pub med_type: String,
    pub unit: String,
    pub strength: String,
    pub category: String,
    pub stock: u32,
    pub reorder_level: u32,
    pub price_per_unit: f64,
    pub low_stock: bool,
}

impl From<Medication> for FfiMedication {
    fn from(m: Medication) -> Self {
        let low_stock = m.is_low_stock();
        Self {
            id: m.id,
            brand_name: m.brand_name,
            scientific_name: m.scientific_name,
            company_name: m.company_name,
            med_type: m.med_type,
            unit: m.unit,
            strength: m.strength,
            category: m.category,
            stock: m.stock,
            reorder_level: m.reorder_level,
            price_per_unit: m.price_per_unit,
            low_stock,
        }
    }
}

impl From<FfiMedication> for Medication {
    fn from(m: FfiMedication) -> Self {
        Medication {
            id: m.id,
            brand_name: m.brand_name,
            scientific_name: m.scientific_name,
            company_name: m.company_name,
            med_type: m.med_type,
            unit: m.unit,
            strength: m.strength,
            category: m.category,
            stock: m.stock,
            reorder_level: m.reorder_level,
            price_per_unit: m.price_per_unit,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCartLine {
    pub medication_id: String,
    pub quantity: u32,
}

impl From<CartLine> for FfiCartLine {
    fn from(line: CartLine) -> Self {
        Self {
            medication_id: line.medication_id,
            quantity: line.quantity,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSaleItem {
    pub medication_id: String,
    pub quantity: u32,
    pub price_at_time: f64,
}

/// FFI-safe sale. `date` is RFC 3339.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSale {
    pub id: String,
    pub customer_name: String,
    pub date: String,
    pub items: Vec<FfiSaleItem>,
    pub total_amount: f64,
    pub payment_status: FfiPaymentStatus,
}

impl From<PharmacySale> for FfiSale {
    fn from(sale: PharmacySale) -> Self {
        Self {
            id: sale.id,
            customer_name: sale.customer_name,
            date: sale.date.to_rfc3339(),
            items: sale
                .items
                .into_iter()
                .map(|i| FfiSaleItem {
                    medication_id: i.medication_id,
                    quantity: i.quantity,
                    price_at_time: i.price_at_time,
                })
                .collect(),
            total_amount: sale.total_amount,
            payment_status: sale.payment_status.into(),
        }
    }
}

/// A stock deduction; `applied < requested` means the zero clamp engaged.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStockDeduction {
    pub medication_id: String,
    pub requested: u32,
    pub applied: u32,
    pub remaining: u32,
}

impl From<models::StockDeduction> for FfiStockDeduction {
    fn from(d: models::StockDeduction) -> Self {
        Self {
            medication_id: d.medication_id,
            requested: d.requested,
            applied: d.applied,
            remaining: d.remaining,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSaleReceipt {
    pub sale: FfiSale,
    pub deductions: Vec<FfiStockDeduction>,
    pub has_shortfall: bool,
}

impl From<SaleReceipt> for FfiSaleReceipt {
    fn from(receipt: SaleReceipt) -> Self {
        let has_shortfall = receipt.shortfalls().next().is_some();
        Self {
            sale: receipt.sale.into(),
            deductions: receipt.deductions.into_iter().map(Into::into).collect(),
            has_shortfall,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescribedMed {
    pub medication_id: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub quantity: Option<u32>,
    /// Units taken from stock when saved. Ignored on submission.
    pub dispensed: Option<u32>,
}

impl From<PrescribedMed> for FfiPrescribedMed {
    fn from(m: PrescribedMed) -> Self {
        Self {
            medication_id: m.medication_id,
            dosage: m.dosage,
            frequency: m.frequency,
            duration: m.duration,
            quantity: m.quantity,
            dispensed: m.dispensed,
        }
    }
}

impl From<FfiPrescribedMed> for PrescribedMed {
    fn from(m: FfiPrescribedMed) -> Self {
        PrescribedMed {
            medication_id: m.medication_id,
            dosage: m.dosage,
            frequency: m.frequency,
            duration: m.duration,
            quantity: m.quantity,
            dispensed: m.dispensed,
        }
    }
}

/// FFI-safe visit. `date` is `YYYY-MM-DD`.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisit {
    pub id: String,
    pub patient_id: String,
    pub date: String,
    pub symptoms: String,
    pub diagnosis: String,
    pub prescribed_meds: Vec<FfiPrescribedMed>,
    pub vitals: HashMap<String, String>,
    pub fee_amount: f64,
    pub payment_status: FfiPaymentStatus,
}

impl From<Visit> for FfiVisit {
    fn from(v: Visit) -> Self {
        Self {
            id: v.id,
            patient_id: v.patient_id,
            date: v.date.to_string(),
            symptoms: v.symptoms,
            diagnosis: v.diagnosis,
            prescribed_meds: v.prescribed_meds.into_iter().map(Into::into).collect(),
            vitals: v.vitals.into_iter().collect(),
            fee_amount: v.fee_amount,
            payment_status: v.payment_status.into(),
        }
    }
}

/// Visit form input. `date` is `YYYY-MM-DD`; set `existing_visit_id` to edit.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisitSubmission {
    pub patient_id: String,
    pub date: Option<String>,
    pub diagnosis: String,
    pub symptoms: Vec<String>,
    pub fee_amount: f64,
    pub payment_status: FfiPaymentStatus,
    pub vitals: HashMap<String, String>,
    pub prescribed_meds: Vec<FfiPrescribedMed>,
    pub existing_visit_id: Option<String>,
}

impl TryFrom<FfiVisitSubmission> for VisitSubmission {
    type Error = ClinicError;

    fn try_from(s: FfiVisitSubmission) -> Result<Self, Self::Error> {
        let date = match s.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
                ClinicError::InvalidInput(format!("Invalid date {}: {}", raw, e))
            })?),
            None => None,
        };
        Ok(VisitSubmission {
            patient_id: s.patient_id,
            date,
            diagnosis: s.diagnosis,
            symptoms: s.symptoms,
            fee_amount: s.fee_amount,
            payment_status: s.payment_status.into(),
            vitals: s.vitals.into_iter().collect(),
            prescribed_meds: s.prescribed_meds.into_iter().map(Into::into).collect(),
            existing_visit_id: s.existing_visit_id,
        })
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisitOutcome {
    pub visit: FfiVisit,
    pub deductions: Vec<FfiStockDeduction>,
    pub missing_medications: Vec<String>,
}

impl From<VisitOutcome> for FfiVisitOutcome {
    fn from(outcome: VisitOutcome) -> Self {
        Self {
            visit: outcome.visit.into(),
            deductions: outcome.deductions.into_iter().map(Into::into).collect(),
            missing_medications: outcome.missing_medications,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReferenceItem {
    pub id: String,
    pub label: String,
    pub unit: Option<String>,
}

impl From<ReferenceItem> for FfiReferenceItem {
    fn from(item: ReferenceItem) -> Self {
        Self {
            id: item.id,
            label: item.label,
            unit: item.unit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(channel: &str) -> Arc<ClinicCore> {
        let config = format!(r#"{{"channel_name": "{}"}}"#, channel);
        open_replica_in_memory(Some(config)).unwrap()
    }

    fn medication(name: &str, stock: u32, price: f64) -> FfiMedication {
        FfiMedication {
            id: String::new(),
            brand_name: name.into(),
            scientific_name: String::new(),
            company_name: String::new(),
            med_type: "Tablet".into(),
            unit: "tab".into(),
            strength: "500mg".into(),
            category: String::new(),
            stock,
            reorder_level: 2,
            price_per_unit: price,
            low_stock: false,
        }
    }

    #[test]
    fn test_sale_through_ffi() {
        let core = open("ffi-sale");
        let med = core.add_medication(medication("Panadol", 10, 50.0)).unwrap();

        core.cart_add(med.id.clone(), 3).unwrap();
        assert_eq!(core.cart_total().unwrap(), 150.0);

        let receipt = core.complete_sale(None, FfiPaymentStatus::Paid).unwrap();
        assert_eq!(receipt.sale.total_amount, 150.0);
        assert!(!receipt.has_shortfall);
        assert!(core.cart_lines().unwrap().is_empty());
        assert_eq!(core.list_medications().unwrap()[0].stock, 7);
    }

    #[test]
    fn test_empty_cart_is_invalid_input() {
        let core = open("ffi-empty");
        let result = core.complete_sale(Some("Bola".into()), FfiPaymentStatus::Paid);
        assert!(matches!(result, Err(ClinicError::InvalidInput(_))));
    }

    #[test]
    fn test_replicas_converge_via_global_hub() {
        let x = open("ffi-converge");
        let y = open("ffi-converge");

        x.add_medication(medication("Panadol", 10, 50.0)).unwrap();
        assert_eq!(y.process_inbound().unwrap(), 1);
        assert_eq!(x.fingerprint().unwrap(), y.fingerprint().unwrap());
        assert!(y.last_synced_at().unwrap().is_some());
    }

    #[test]
    fn test_visit_date_validation() {
        let core = open("ffi-visit");
        let patient = core
            .register_patient(FfiPatient {
                id: String::new(),
                code: String::new(),
                name: "Amina".into(),
                age: 30,
                gender: "F".into(),
                phone: String::new(),
                address: String::new(),
                allergies: Some(" ".into()),
                chronic_conditions: None,
            })
            .unwrap();
        assert!(patient.code.starts_with("P-"));
        assert_eq!(patient.allergies, None);

        let mut submission = FfiVisitSubmission {
            patient_id: patient.id.clone(),
            date: Some("01/05/2024".into()),
            diagnosis: String::new(),
            symptoms: vec![],
            fee_amount: 0.0,
            payment_status: FfiPaymentStatus::Pending,
            vitals: HashMap::new(),
            prescribed_meds: vec![],
            existing_visit_id: None,
        };
        assert!(matches!(
            core.submit_visit(submission.clone()),
            Err(ClinicError::InvalidInput(_))
        ));

        submission.date = Some("2024-05-01".into());
        let outcome = core.submit_visit(submission).unwrap();
        assert_eq!(outcome.visit.date, "2024-05-01");
        assert_eq!(core.list_visits(Some(patient.id)).unwrap().len(), 1);
    }

    #[test]
    fn test_import_requires_confirmation() {
        let core = open("ffi-import");
        assert!(core.confirm_patient_import().is_err());

        let rows = vec![
            PATIENT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            vec!["".into(), "Amina".into(), "".into()],
        ];
        let preview = core.preview_patient_import(rows).unwrap();
        assert_eq!(preview[0].age, 0);
        assert!(core.list_patients().unwrap().is_empty());

        assert_eq!(core.confirm_patient_import().unwrap(), 1);
        assert_eq!(core.list_patients().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_reference_list() {
        let core = open("ffi-reference");
        assert!(matches!(
            core.reference_items("colours".into()),
            Err(ClinicError::InvalidInput(_))
        ));
        let item = core
            .add_reference_item("symptoms".into(), "Rash".into(), None)
            .unwrap();
        core.remove_reference_item("symptoms".into(), item.id).unwrap();
    }
}

//! The replica: sole owner of one copy of the clinic state.
//!
//! Every mutation funnels through [`Replica`], which runs it on a working
//! copy, persists the whole snapshot in one transaction, adopts the copy and
//! then lets the [`SyncCoordinator`] decide whether to broadcast.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::ClinicConfig;
use crate::db::{Database, DbError, DurableStore};
use crate::models::{
    Aggregate, ClinicState, Medication, Patient, PaymentStatus, PharmacySale, ReferenceItem,
    ReferenceList, Visit,
};
use crate::mutators::{
    self, Cart, MutationError, MutationResult, SaleReceipt, VisitOutcome, VisitSubmission,
};
use crate::sync::{
    ChangeOrigin, Clock, ReplicationChannel, SubscriptionId, SyncCoordinator, SyncDecision,
    SyncError, SyncMessage, SyncPhase, SystemClock,
};
use crate::transfer::PatientImport;

/// Replica errors.
#[derive(Error, Debug)]
pub enum ReplicaError {
    #[error("Storage error: {0}")]
    Storage(#[from] DbError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Rejected: {0}")]
    Rejected(#[from] MutationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ReplicaResult<T> = Result<T, ReplicaError>;

type Inbox = Arc<Mutex<VecDeque<SyncMessage>>>;

/// One open copy of the application.
pub struct Replica {
    state: ClinicState,
    store: DurableStore,
    channel: Box<dyn ReplicationChannel>,
    subscription: Option<SubscriptionId>,
    inbox: Inbox,
    coordinator: SyncCoordinator,
    clock: Arc<dyn Clock>,
    config: ClinicConfig,
}

impl Replica {
    /// Load state from `db` and join the replication channel.
    pub fn open(
        db: Database,
        channel: Box<dyn ReplicationChannel>,
        config: ClinicConfig,
    ) -> ReplicaResult<Self> {
        Self::with_clock(db, channel, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        db: Database,
        channel: Box<dyn ReplicationChannel>,
        config: ClinicConfig,
        clock: Arc<dyn Clock>,
    ) -> ReplicaResult<Self> {
        let store = DurableStore::new(db, config.namespace.clone());
        let state = store.load_state();

        let mut coordinator = SyncCoordinator::new(config.debounce());
        coordinator.restore_last_synced_at(store.last_remote_sync()?);

        let inbox: Inbox = Arc::new(Mutex::new(VecDeque::new()));
        let sink = Arc::clone(&inbox);
        let subscription = channel.subscribe(Box::new(move |message: &SyncMessage| {
            sink.lock()
                .unwrap_or_else(|e| e.into_inner())
                .push_back(message.clone());
        }))?;

        tracing::info!(
            channel = channel.channel_name(),
            namespace = %config.namespace,
            patients = state.patients.len(),
            medications = state.medications.len(),
            "replica opened"
        );

        Ok(Self {
            state,
            store,
            channel,
            subscription: Some(subscription),
            inbox,
            coordinator,
            clock,
            config,
        })
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Advance the sync timer. Broadcasts a deferred snapshot if one is due.
    /// Returns true if a broadcast was attempted.
    pub fn tick(&mut self) -> bool {
        if self.coordinator.poll(self.clock.now()) {
            self.publish_snapshot();
            return true;
        }
        false
    }

    /// Messages waiting in the inbox.
    pub fn pending_inbound(&self) -> usize {
        self.inbox.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Apply every queued inbound snapshot in arrival order. Returns the
    /// number applied.
    pub fn process_inbound(&mut self) -> usize {
        let queued: Vec<SyncMessage> = {
            let mut inbox = self.inbox.lock().unwrap_or_else(|e| e.into_inner());
            inbox.drain(..).collect()
        };
        let count = queued.len();
        for message in queued {
            self.apply_remote(message);
        }
        count
    }

    /// Apply a snapshot received from another replica.
    ///
    /// Collections present in the payload replace local ones wholesale. The
    /// change is an echo: it is neither persisted nor broadcast.
    pub fn apply_remote(&mut self, message: SyncMessage) -> Vec<Aggregate> {
        let now = self.clock.now();
        let wall = self.clock.wall();

        self.coordinator.begin_remote_apply(now, wall);
        let applied = self.state.apply_payload(message.into_payload());
        let decision = self.coordinator.observe_change(ChangeOrigin::Remote, now);
        debug_assert_eq!(decision, SyncDecision::Suppress);

        if let Err(e) = self.store.set_last_remote_sync(wall) {
            tracing::warn!(error = %e, "failed to persist last sync time");
        }

        tracing::debug!(
            keys = ?applied.iter().map(Aggregate::key).collect::<Vec<_>>(),
            fingerprint = ?self.state.fingerprint().ok(),
            "applied remote snapshot"
        );
        applied
    }

    /// Decode and apply a wire message from an external transport.
    pub fn receive_raw(&mut self, json: &str) -> ReplicaResult<Vec<Aggregate>> {
        let message = SyncMessage::from_json(json).map_err(|e| {
            tracing::warn!(error = %e, "dropping malformed sync message");
            e
        })?;
        Ok(self.apply_remote(message))
    }

    fn publish_snapshot(&mut self) {
        let message = SyncMessage::SyncAll(self.state.to_payload());
        match self.channel.publish(&message) {
            Ok(receivers) => tracing::debug!(
                receivers,
                fingerprint = ?self.state.fingerprint().ok(),
                "broadcast snapshot"
            ),
            Err(e) => {
                tracing::warn!(error = %e, "broadcast failed, retrying on next tick");
                self.coordinator.mark_pending();
            }
        }
    }

    /// Persist `next`, adopt it, and broadcast per the coordinator.
    fn commit(&mut self, next: ClinicState) -> ReplicaResult<()> {
        if let Err(e) = self.store.save_state(&next) {
            tracing::error!(error = %e, "failed to persist snapshot, change discarded");
            return Err(e.into());
        }
        self.state = next;

        match self
            .coordinator
            .observe_change(ChangeOrigin::Local, self.clock.now())
        {
            SyncDecision::Publish => self.publish_snapshot(),
            SyncDecision::Defer => {
                tracing::debug!("local change during remote apply, broadcast deferred")
            }
            SyncDecision::Suppress => {}
        }
        Ok(())
    }

    fn mutate<T>(
        &mut self,
        mutation: impl FnOnce(&mut ClinicState) -> MutationResult<T>,
    ) -> ReplicaResult<T> {
        let mut next = self.state.clone();
        let outcome = mutation(&mut next)?;
        self.commit(next)?;
        Ok(outcome)
    }

    // =========================================================================
    // Mutators
    // =========================================================================

    /// Sell the cart's contents and clear it.
    ///
    /// A blank customer name records the configured walk-in label.
    pub fn complete_sale(
        &mut self,
        cart: &mut Cart,
        customer_name: Option<&str>,
        payment_status: PaymentStatus,
    ) -> ReplicaResult<SaleReceipt> {
        let customer = customer_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.config.walk_in_label.as_str())
            .to_string();
        let now = self.clock.wall();

        let receipt = self.mutate(|state| {
            mutators::complete_sale(state, cart.lines(), &customer, payment_status, now)
        })?;
        cart.clear();

        if receipt.shortfalls().next().is_some() {
            tracing::warn!(sale_id = %receipt.sale.id, "sale completed with stock shortfall");
        }
        Ok(receipt)
    }

    pub fn submit_visit(&mut self, submission: VisitSubmission) -> ReplicaResult<VisitOutcome> {
        let policy = self.config.visit_edit_policy;
        let outcome = self.mutate(|state| mutators::submit_visit(state, submission, policy))?;

        if !outcome.missing_medications.is_empty() {
            tracing::warn!(
                visit_id = %outcome.visit.id,
                missing = ?outcome.missing_medications,
                "visit prescribes medications that no longer exist"
            );
        }
        Ok(outcome)
    }

    pub fn register_patient(&mut self, patient: Patient) -> ReplicaResult<Patient> {
        self.mutate(|state| mutators::register_patient(state, patient))
    }

    pub fn update_patient(&mut self, patient: Patient) -> ReplicaResult<()> {
        self.mutate(|state| mutators::update_patient(state, patient))
    }

    pub fn add_medication(&mut self, medication: Medication) -> ReplicaResult<Medication> {
        self.mutate(|state| mutators::add_medication(state, medication))
    }

    pub fn update_medication(&mut self, medication: Medication) -> ReplicaResult<()> {
        self.mutate(|state| mutators::update_medication(state, medication))
    }

    pub fn restock_medication(&mut self, medication_id: &str, quantity: u32) -> ReplicaResult<u32> {
        self.mutate(|state| mutators::restock_medication(state, medication_id, quantity))
    }

    pub fn set_visit_payment_status(
        &mut self,
        visit_id: &str,
        status: PaymentStatus,
    ) -> ReplicaResult<()> {
        self.mutate(|state| mutators::set_visit_payment_status(state, visit_id, status))
    }

    pub fn set_sale_payment_status(
        &mut self,
        sale_id: &str,
        status: PaymentStatus,
    ) -> ReplicaResult<()> {
        self.mutate(|state| mutators::set_sale_payment_status(state, sale_id, status))
    }

    pub fn add_reference_item(
        &mut self,
        list: ReferenceList,
        label: &str,
        unit: Option<String>,
    ) -> ReplicaResult<ReferenceItem> {
        self.mutate(|state| mutators::add_reference_item(state, list, label, unit))
    }

    pub fn remove_reference_item(
        &mut self,
        list: ReferenceList,
        item_id: &str,
    ) -> ReplicaResult<ReferenceItem> {
        self.mutate(|state| mutators::remove_reference_item(state, list, item_id))
    }

    /// Confirm an import: replace the whole patient collection.
    pub fn import_patients(&mut self, preview: PatientImport) -> ReplicaResult<usize> {
        let replaced = self.state.patients.len();
        let count = self.mutate(|state| {
            state.patients = preview.into_patients();
            Ok(state.patients.len())
        })?;
        tracing::info!(imported = count, replaced, "patients imported");
        Ok(count)
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// Add units to a cart, bounded by the medication's current stock.
    pub fn add_to_cart(
        &self,
        cart: &mut Cart,
        medication_id: &str,
        quantity: u32,
    ) -> ReplicaResult<u32> {
        let medication = self.require_medication(medication_id)?;
        Ok(cart.add(medication, quantity)?)
    }

    pub fn set_cart_quantity(
        &self,
        cart: &mut Cart,
        medication_id: &str,
        quantity: u32,
    ) -> ReplicaResult<()> {
        let medication = self.require_medication(medication_id)?;
        Ok(cart.set_quantity(medication, quantity)?)
    }

    pub fn cart_total(&self, cart: &Cart) -> f64 {
        cart.total(&self.state)
    }

    fn require_medication(&self, medication_id: &str) -> ReplicaResult<&Medication> {
        self.state
            .medication(medication_id)
            .ok_or_else(|| MutationError::UnknownMedication(medication_id.to_string()).into())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn state(&self) -> &ClinicState {
        &self.state
    }

    pub fn config(&self) -> &ClinicConfig {
        &self.config
    }

    pub fn patients(&self) -> &[Patient] {
        &self.state.patients
    }

    pub fn patient(&self, id: &str) -> Option<&Patient> {
        self.state.patient(id)
    }

    pub fn medications(&self) -> &[Medication] {
        &self.state.medications
    }

    pub fn medication(&self, id: &str) -> Option<&Medication> {
        self.state.medication(id)
    }

    /// Brand name, or "Unknown" if the medication no longer exists.
    pub fn medication_name(&self, id: &str) -> &str {
        self.state.medication_name(id)
    }

    pub fn low_stock_medications(&self) -> Vec<&Medication> {
        self.state
            .medications
            .iter()
            .filter(|m| m.is_low_stock())
            .collect()
    }

    pub fn visits(&self) -> &[Visit] {
        &self.state.visits
    }

    /// A patient's visits, newest first.
    pub fn visits_for_patient(&self, patient_id: &str) -> Vec<&Visit> {
        let mut visits: Vec<&Visit> = self
            .state
            .visits
            .iter()
            .filter(|v| v.patient_id == patient_id)
            .collect();
        visits.sort_by(|a, b| b.date.cmp(&a.date));
        visits
    }

    pub fn sales(&self) -> &[PharmacySale] {
        &self.state.sales
    }

    pub fn reference(&self, list: ReferenceList) -> &[ReferenceItem] {
        self.state.reference(list)
    }

    pub fn fingerprint(&self) -> ReplicaResult<String> {
        Ok(self.state.fingerprint()?)
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.coordinator.last_synced_at()
    }

    pub fn sync_phase(&self) -> SyncPhase {
        self.coordinator.phase()
    }

    pub fn suppressed_echoes(&self) -> u64 {
        self.coordinator.suppressed_echoes()
    }

    pub fn has_pending_publish(&self) -> bool {
        self.coordinator.has_pending_publish()
    }
}

impl Drop for Replica {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.take() {
            if let Err(e) = self.channel.unsubscribe(id) {
                tracing::warn!(error = %e, "failed to leave replication channel");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{BroadcastHub, ManualClock};
    use std::time::Duration;

    fn open_replica(hub: &BroadcastHub, clock: &Arc<ManualClock>) -> Replica {
        Replica::with_clock(
            Database::open_in_memory().unwrap(),
            Box::new(hub.open("clinic-sync").unwrap()),
            ClinicConfig::default(),
            clock.clone(),
        )
        .unwrap()
    }

    fn seed_medication(replica: &mut Replica, stock: u32, price: f64) -> String {
        let mut med = Medication::new("Panadol".into(), stock, price);
        med.reorder_level = 2;
        replica.add_medication(med).unwrap().id
    }

    #[test]
    fn test_open_loads_seeded_defaults() {
        let hub = BroadcastHub::new();
        let clock = Arc::new(ManualClock::new());
        let replica = open_replica(&hub, &clock);

        assert!(replica.patients().is_empty());
        assert!(!replica.reference(ReferenceList::VitalDefinitions).is_empty());
        assert_eq!(replica.sync_phase(), SyncPhase::Idle);
        assert_eq!(hub.subscriber_count("clinic-sync"), 1);
    }

    #[test]
    fn test_sale_clears_cart_and_persists() {
        let hub = BroadcastHub::new();
        let clock = Arc::new(ManualClock::new());
        let mut replica = open_replica(&hub, &clock);
        let id = seed_medication(&mut replica, 10, 50.0);

        let mut cart = Cart::new();
        replica.add_to_cart(&mut cart, &id, 3).unwrap();
        assert_eq!(replica.cart_total(&cart), 150.0);

        let receipt = replica
            .complete_sale(&mut cart, None, PaymentStatus::Paid)
            .unwrap();

        assert!(cart.is_empty());
        assert_eq!(receipt.sale.customer_name, "Walk-in Customer");
        assert_eq!(replica.medication(&id).unwrap().stock, 7);
        assert_eq!(replica.store.load_state(), *replica.state());
    }

    #[test]
    fn test_rejected_sale_keeps_cart_and_state() {
        let hub = BroadcastHub::new();
        let clock = Arc::new(ManualClock::new());
        let mut replica = open_replica(&hub, &clock);
        let before = replica.fingerprint().unwrap();

        let mut cart = Cart::new();
        let result = replica.complete_sale(&mut cart, Some("Bola"), PaymentStatus::Paid);
        assert!(matches!(
            result,
            Err(ReplicaError::Rejected(MutationError::EmptyCart))
        ));
        assert_eq!(replica.fingerprint().unwrap(), before);
        assert!(replica.sales().is_empty());
    }

    #[test]
    fn test_add_to_cart_unknown_medication() {
        let hub = BroadcastHub::new();
        let clock = Arc::new(ManualClock::new());
        let replica = open_replica(&hub, &clock);

        let mut cart = Cart::new();
        assert!(matches!(
            replica.add_to_cart(&mut cart, "nope", 1),
            Err(ReplicaError::Rejected(MutationError::UnknownMedication(_)))
        ));
    }

    #[test]
    fn test_remote_apply_is_not_echoed() {
        let hub = BroadcastHub::new();
        let clock = Arc::new(ManualClock::new());
        let mut x = open_replica(&hub, &clock);
        let mut y = open_replica(&hub, &clock);

        seed_medication(&mut x, 10, 50.0);
        assert_eq!(y.pending_inbound(), 1);
        assert_eq!(x.pending_inbound(), 0);

        assert_eq!(y.process_inbound(), 1);
        assert_eq!(y.fingerprint().unwrap(), x.fingerprint().unwrap());
        assert_eq!(y.suppressed_echoes(), 1);
        assert!(y.last_synced_at().is_some());

        // Nothing came back to X.
        clock.advance(Duration::from_secs(1));
        assert!(!y.tick());
        assert_eq!(x.pending_inbound(), 0);
    }

    #[test]
    fn test_local_change_during_window_is_deferred() {
        let hub = BroadcastHub::new();
        let clock = Arc::new(ManualClock::new());
        let mut x = open_replica(&hub, &clock);
        let mut y = open_replica(&hub, &clock);

        seed_medication(&mut x, 10, 50.0);
        y.process_inbound();
        assert!(matches!(y.sync_phase(), SyncPhase::ApplyingRemote { .. }));

        y.register_patient(Patient::new("Amina".into())).unwrap();
        assert!(y.has_pending_publish());
        assert_eq!(x.pending_inbound(), 0);

        clock.advance(Duration::from_millis(100));
        assert!(y.tick());
        x.process_inbound();
        assert_eq!(x.patients().len(), 1);
        assert_eq!(x.fingerprint().unwrap(), y.fingerprint().unwrap());
    }

    #[test]
    fn test_receive_raw_rejects_malformed() {
        let hub = BroadcastHub::new();
        let clock = Arc::new(ManualClock::new());
        let mut replica = open_replica(&hub, &clock);

        assert!(matches!(
            replica.receive_raw(r#"{"type":"PATCH","payload":{}}"#),
            Err(ReplicaError::Sync(SyncError::Malformed(_)))
        ));
        assert_eq!(replica.sync_phase(), SyncPhase::Idle);

        let applied = replica
            .receive_raw(r#"{"type":"SYNC_ALL","payload":{"sales":[]}}"#)
            .unwrap();
        assert_eq!(applied, vec![Aggregate::Sales]);
    }

    #[test]
    fn test_visits_for_patient_newest_first() {
        let hub = BroadcastHub::new();
        let clock = Arc::new(ManualClock::new());
        let mut replica = open_replica(&hub, &clock);
        let patient = replica
            .register_patient(Patient::new("Amina".into()))
            .unwrap();

        for day in [3, 1, 2] {
            replica
                .submit_visit(VisitSubmission {
                    patient_id: patient.id.clone(),
                    date: chrono::NaiveDate::from_ymd_opt(2024, 5, day),
                    ..VisitSubmission::default()
                })
                .unwrap();
        }

        let days: Vec<u32> = replica
            .visits_for_patient(&patient.id)
            .iter()
            .map(|v| chrono::Datelike::day(&v.date))
            .collect();
        assert_eq!(days, vec![3, 2, 1]);
    }

    #[test]
    fn test_low_stock() {
        let hub = BroadcastHub::new();
        let clock = Arc::new(ManualClock::new());
        let mut replica = open_replica(&hub, &clock);
        seed_medication(&mut replica, 2, 1.0);
        seed_medication(&mut replica, 20, 1.0);

        assert_eq!(replica.low_stock_medications().len(), 1);
    }

    #[test]
    fn test_drop_leaves_channel() {
        let hub = BroadcastHub::new();
        let clock = Arc::new(ManualClock::new());
        {
            let _replica = open_replica(&hub, &clock);
            assert_eq!(hub.subscriber_count("clinic-sync"), 1);
        }
        assert_eq!(hub.subscriber_count("clinic-sync"), 0);
    }
}

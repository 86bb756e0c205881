//! Publish/subscribe transport between replicas.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use super::{SyncError, SyncMessage, SyncResult};

/// Callback invoked for each inbound message.
pub type MessageHandler = Box<dyn Fn(&SyncMessage) + Send + Sync>;

/// Handle returned by [`ReplicationChannel::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A broadcast channel shared by all replicas of one installation.
///
/// `publish` reaches every other open replica, never the sender.
pub trait ReplicationChannel: Send {
    /// Logical channel name shared by all replicas.
    fn channel_name(&self) -> &str;

    /// Deliver `message` to every other replica. Returns the number of
    /// handlers reached.
    fn publish(&self, message: &SyncMessage) -> SyncResult<usize>;

    /// Register a handler for inbound messages.
    fn subscribe(&self, handler: MessageHandler) -> SyncResult<SubscriptionId>;

    /// Remove a handler. Returns false if it was not registered.
    fn unsubscribe(&self, id: SubscriptionId) -> SyncResult<bool>;
}

type SharedHandler = Arc<dyn Fn(&SyncMessage) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    endpoint: u64,
    handler: SharedHandler,
}

#[derive(Default)]
struct HubState {
    next_endpoint: u64,
    next_subscription: u64,
    channels: HashMap<String, Vec<Subscription>>,
}

/// In-process bus of named channels.
///
/// Messages cross the hub in their JSON wire form and are decoded on
/// delivery, the way a browser broadcast channel clones data between tabs.
#[derive(Clone, Default)]
pub struct BroadcastHub {
    state: Arc<Mutex<HubState>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide hub.
    pub fn global() -> &'static BroadcastHub {
        static GLOBAL: OnceLock<BroadcastHub> = OnceLock::new();
        GLOBAL.get_or_init(BroadcastHub::new)
    }

    /// Open a new endpoint on channel `name`.
    pub fn open(&self, name: impl Into<String>) -> SyncResult<HubChannel> {
        let mut state = self.lock()?;
        state.next_endpoint += 1;
        Ok(HubChannel {
            hub: self.clone(),
            name: name.into(),
            endpoint: state.next_endpoint,
        })
    }

    /// Number of live subscriptions on `name`.
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.lock()
            .map(|state| state.channels.get(name).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn lock(&self) -> SyncResult<MutexGuard<'_, HubState>> {
        self.state
            .lock()
            .map_err(|e| SyncError::Poisoned(e.to_string()))
    }
}

/// One replica's endpoint on a [`BroadcastHub`] channel.
pub struct HubChannel {
    hub: BroadcastHub,
    name: String,
    endpoint: u64,
}

impl ReplicationChannel for HubChannel {
    fn channel_name(&self) -> &str {
        &self.name
    }

    fn publish(&self, message: &SyncMessage) -> SyncResult<usize> {
        let wire = message.to_json()?;

        // Handlers run outside the lock so they may publish in turn.
        let handlers: Vec<SharedHandler> = {
            let state = self.hub.lock()?;
            state
                .channels
                .get(&self.name)
                .map(|subs| {
                    subs.iter()
                        .filter(|s| s.endpoint != self.endpoint)
                        .map(|s| Arc::clone(&s.handler))
                        .collect()
                })
                .unwrap_or_default()
        };

        if handlers.is_empty() {
            return Ok(0);
        }

        let delivered = SyncMessage::from_json(&wire)?;
        for handler in &handlers {
            handler(&delivered);
        }

        tracing::debug!(
            channel = %self.name,
            bytes = wire.len(),
            receivers = handlers.len(),
            "published snapshot"
        );
        Ok(handlers.len())
    }

    fn subscribe(&self, handler: MessageHandler) -> SyncResult<SubscriptionId> {
        let mut state = self.hub.lock()?;
        state.next_subscription += 1;
        let id = SubscriptionId(state.next_subscription);
        state
            .channels
            .entry(self.name.clone())
            .or_default()
            .push(Subscription {
                id,
                endpoint: self.endpoint,
                handler: Arc::from(handler),
            });
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> SyncResult<bool> {
        let mut state = self.hub.lock()?;
        let Some(subs) = state.channels.get_mut(&self.name) else {
            return Ok(false);
        };
        let before = subs.len();
        subs.retain(|s| !(s.id == id && s.endpoint == self.endpoint));
        Ok(subs.len() < before)
    }
}

impl Drop for HubChannel {
    fn drop(&mut self) {
        if let Ok(mut state) = self.hub.state.lock() {
            if let Some(subs) = state.channels.get_mut(&self.name) {
                subs.retain(|s| s.endpoint != self.endpoint);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SnapshotPayload;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: &Arc<AtomicUsize>) -> MessageHandler {
        let counter = Arc::clone(counter);
        Box::new(move |_msg| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn empty_message() -> SyncMessage {
        SyncMessage::SyncAll(SnapshotPayload::default())
    }

    #[test]
    fn test_publish_skips_sender() {
        let hub = BroadcastHub::new();
        let a = hub.open("clinic").unwrap();
        let b = hub.open("clinic").unwrap();

        let a_count = Arc::new(AtomicUsize::new(0));
        let b_count = Arc::new(AtomicUsize::new(0));
        a.subscribe(counting_handler(&a_count)).unwrap();
        b.subscribe(counting_handler(&b_count)).unwrap();

        let reached = a.publish(&empty_message()).unwrap();
        assert_eq!(reached, 1);
        assert_eq!(a_count.load(Ordering::SeqCst), 0);
        assert_eq!(b_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_channels_are_isolated_by_name() {
        let hub = BroadcastHub::new();
        let a = hub.open("clinic-a").unwrap();
        let b = hub.open("clinic-b").unwrap();

        let b_count = Arc::new(AtomicUsize::new(0));
        b.subscribe(counting_handler(&b_count)).unwrap();

        assert_eq!(a.publish(&empty_message()).unwrap(), 0);
        assert_eq!(b_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let hub = BroadcastHub::new();
        let a = hub.open("clinic").unwrap();
        let b = hub.open("clinic").unwrap();

        let b_count = Arc::new(AtomicUsize::new(0));
        let id = b.subscribe(counting_handler(&b_count)).unwrap();
        assert!(b.unsubscribe(id).unwrap());
        assert!(!b.unsubscribe(id).unwrap());

        a.publish(&empty_message()).unwrap();
        assert_eq!(b_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_other_endpoint_cannot_unsubscribe() {
        let hub = BroadcastHub::new();
        let a = hub.open("clinic").unwrap();
        let b = hub.open("clinic").unwrap();

        let id = b.subscribe(Box::new(|_| {})).unwrap();
        assert!(!a.unsubscribe(id).unwrap());
        assert_eq!(hub.subscriber_count("clinic"), 1);
    }

    #[test]
    fn test_drop_removes_subscriptions() {
        let hub = BroadcastHub::new();
        let a = hub.open("clinic").unwrap();
        {
            let b = hub.open("clinic").unwrap();
            b.subscribe(Box::new(|_| {})).unwrap();
            assert_eq!(hub.subscriber_count("clinic"), 1);
        }
        assert_eq!(hub.subscriber_count("clinic"), 0);
        assert_eq!(a.publish(&empty_message()).unwrap(), 0);
    }

    #[test]
    fn test_delivered_message_is_decoded_copy() {
        let hub = BroadcastHub::new();
        let a = hub.open("clinic").unwrap();
        let b = hub.open("clinic").unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        b.subscribe(Box::new(move |msg| sink.lock().unwrap().push(msg.clone())))
            .unwrap();

        let message = SyncMessage::SyncAll(SnapshotPayload {
            patients: Some(Vec::new()),
            ..SnapshotPayload::default()
        });
        a.publish(&message).unwrap();

        assert_eq!(received.lock().unwrap().as_slice(), &[message]);
    }
}

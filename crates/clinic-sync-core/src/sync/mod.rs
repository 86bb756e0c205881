//! Replica-to-replica synchronization.
//!
//! Protocol:
//! 1. A genuine local change is persisted, then the full snapshot is
//!    published as `{"type": "SYNC_ALL", "payload": {...}}`
//! 2. Every other replica on the channel queues the message
//! 3. The receiver enters `ApplyingRemote`, replaces each collection present
//!    in the payload, and stays guarded for the debounce window
//! 4. Changes observed inside the window are echoes and are never re-broadcast

mod channel;
mod coordinator;

pub use channel::*;
pub use coordinator::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::SnapshotPayload;

/// Sync errors.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to encode sync message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Malformed sync message: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Channel lock poisoned: {0}")]
    Poisoned(String),
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Message exchanged between replicas.
///
/// Only one message type exists; its payload always carries complete
/// collections, never deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SyncMessage {
    #[serde(rename = "SYNC_ALL")]
    SyncAll(SnapshotPayload),
}

impl SyncMessage {
    pub fn payload(&self) -> &SnapshotPayload {
        match self {
            SyncMessage::SyncAll(payload) => payload,
        }
    }

    pub fn into_payload(self) -> SnapshotPayload {
        match self {
            SyncMessage::SyncAll(payload) => payload,
        }
    }

    /// Encode to the wire format.
    pub fn to_json(&self) -> SyncResult<String> {
        serde_json::to_string(self).map_err(SyncError::Encode)
    }

    /// Decode from the wire format.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        serde_json::from_str(json).map_err(SyncError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Medication;

    #[test]
    fn test_wire_shape() {
        let message = SyncMessage::SyncAll(SnapshotPayload {
            sales: Some(Vec::new()),
            ..SnapshotPayload::default()
        });
        let json = message.to_json().unwrap();
        assert_eq!(json, r#"{"type":"SYNC_ALL","payload":{"sales":[]}}"#);
    }

    #[test]
    fn test_decode_partial_payload() {
        let json = r#"{"type":"SYNC_ALL","payload":{"medications":[{"id":"m1","brandName":"Panadol","stock":7,"reorderLevel":2,"pricePerUnit":50}]}}"#;
        let message = SyncMessage::from_json(json).unwrap();
        let payload = message.into_payload();

        let meds: Vec<Medication> = payload.medications.unwrap();
        assert_eq!(meds[0].stock, 7);
        assert!(payload.patients.is_none());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let json = r#"{"type":"PATCH","payload":{}}"#;
        assert!(matches!(
            SyncMessage::from_json(json),
            Err(SyncError::Malformed(_))
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(SyncMessage::from_json("not json").is_err());
    }
}

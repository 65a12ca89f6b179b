//! Pending store: sent-but-unacknowledged message records.
//!
//! Every guaranteed message lives here from the moment it is first
//! transmitted until either its acknowledgment arrives (the record is
//! removed and its callback fired) or the application clears the store (the
//! record is discarded and its callback never fires).  Entries persist
//! across connection loss and replacement — that persistence is what makes
//! resend-on-reattach possible.
//!
//! Same division of labour as the send-side window state machines: this
//! module only manages state; all transmission is the caller's
//! responsibility.

use std::collections::HashMap;

use serde_json::Value;

use crate::connection::AckFn;
use crate::envelope::MessageId;

// ---------------------------------------------------------------------------
// MessageRecord
// ---------------------------------------------------------------------------

/// One guaranteed message awaiting acknowledgment.
pub struct MessageRecord {
    /// Correlation id matched against incoming acks.
    pub id: MessageId,
    /// Event name the message is (re)transmitted under.
    pub event: String,
    /// Application payload, kept verbatim for retransmission.
    pub payload: Value,
    /// Callback fired exactly once when the acknowledgment arrives.
    pub ack_callback: Option<AckFn>,
    /// Total number of transmission attempts (initial send + resends).
    pub tx_count: u32,
}

impl std::fmt::Debug for MessageRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRecord")
            .field("id", &self.id)
            .field("event", &self.event)
            .field("payload", &self.payload)
            .field("ack_callback", &self.ack_callback.is_some())
            .field("tx_count", &self.tx_count)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PendingStore
// ---------------------------------------------------------------------------

/// Mapping from correlation id to [`MessageRecord`].
///
/// Invariant: every entry represents a message transmitted at least once
/// (or attempted while detached) but not yet acknowledged.  Iteration order
/// is irrelevant.
#[derive(Debug, Default)]
pub struct PendingStore {
    map: HashMap<MessageId, MessageRecord>,
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly sent message.  Ids are unique by construction, so an
    /// insert never displaces an existing entry in practice.
    pub fn insert(&mut self, record: MessageRecord) {
        self.map.insert(record.id, record);
    }

    /// Remove and return the record for `id`.
    ///
    /// Idempotent: removing an absent id returns `None` and changes nothing,
    /// which is what makes duplicate acknowledgment signals safe.
    pub fn remove(&mut self, id: MessageId) -> Option<MessageRecord> {
        self.map.remove(&id)
    }

    /// Mutable iteration over every pending record, for resend.
    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut MessageRecord> {
        self.map.values_mut()
    }

    /// Ids of all pending records, in no particular order.
    pub fn ids(&self) -> Vec<MessageId> {
        self.map.keys().copied().collect()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.map.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Discard every record without invoking any callback.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

//! Sent-ack registry: receiver-side duplicate suppression.
//!
//! Records every correlation id this endpoint has already acknowledged.
//! When a guaranteed message is retransmitted because its acknowledgment was
//! lost in transit, the id is found here and the message is discarded
//! without re-invoking the application callback.
//!
//! The set is monotonic — entries are never pruned.  Capping or expiring it
//! would reopen the duplicate-delivery window for sufficiently late
//! retransmits, so long-lived endpoints trade unbounded memory for correct
//! suppression.

use std::collections::HashSet;

use crate::envelope::MessageId;

/// Set of correlation ids already acknowledged by this endpoint.
#[derive(Debug, Default)]
pub struct AckRegistry {
    acked: HashSet<MessageId>,
}

impl AckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that an acknowledgment for `id` has been sent.
    pub fn mark(&mut self, id: MessageId) {
        self.acked.insert(id);
    }

    /// `true` when `id` was already acknowledged — i.e. a message carrying
    /// it is a retransmitted duplicate.
    pub fn contains(&self, id: MessageId) -> bool {
        self.acked.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.acked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acked.is_empty()
    }
}

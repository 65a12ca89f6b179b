//! Event router: envelope unwrapping, duplicate suppression, auto-ack.
//!
//! Every application listener is registered on the transport through a thin
//! wrapper ([`wrap`]) whose only job is to forward the raw incoming value to
//! [`deliver`] together with the shared protocol context.  The context is an
//! explicit argument — the routing logic holds no back-reference to the
//! facade, so it can be exercised in isolation.
//!
//! Incoming-value algorithm (applied per listener):
//! 1. Value parses as an [`Envelope`]:
//!    a. id already in the sent-ack registry → retransmitted duplicate whose
//!       ack was lost; discard without invoking the listener.
//!    b. otherwise invoke the listener with `(payload, ack_sender, Some(id))`
//!       and, in auto-ack mode, immediately send the ack with no data.
//! 2. Anything else (including malformed envelopes) passes through unchanged
//!    with the transport's native ack, if any.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use log::{debug, trace};
use serde_json::Value;

use crate::connection::AckFn;
use crate::envelope::{Ack, Envelope, MessageId, WireError, ACK_EVENT};
use crate::socket::Core;

/// Application-level listener: `(payload, ack sender, correlation id)`.
///
/// The id is `Some` only for guaranteed messages; raw messages arrive with
/// `None` and an [`AckSender`] wrapping the transport's native reply path.
pub type Listener = Box<dyn FnMut(Value, AckSender, Option<MessageId>)>;

// ---------------------------------------------------------------------------
// AckSender
// ---------------------------------------------------------------------------

/// Handle a listener uses to acknowledge the message it was invoked with.
///
/// Cloneable so the router can keep one for auto-ack while handing one to
/// the listener.  Calling [`send`](AckSender::send) more than once re-emits
/// the ack frame (guaranteed variant) or does nothing (native variant); the
/// original sender removes its pending record idempotently either way.
#[derive(Clone)]
pub struct AckSender {
    kind: SenderKind,
}

#[derive(Clone)]
enum SenderKind {
    /// Acks a guaranteed message: records the id in the sent-ack registry
    /// and emits `{id, data}` on the reserved control event.
    Guaranteed {
        id: MessageId,
        core: Weak<RefCell<Core>>,
    },
    /// Transport-native reply for a raw message.  `None` inside the slot
    /// means the transport offered no reply path (or it was already used).
    Native(Rc<RefCell<Option<AckFn>>>),
}

impl AckSender {
    pub(crate) fn guaranteed(id: MessageId, core: Weak<RefCell<Core>>) -> Self {
        Self {
            kind: SenderKind::Guaranteed { id, core },
        }
    }

    pub(crate) fn native(ack: Option<AckFn>) -> Self {
        Self {
            kind: SenderKind::Native(Rc::new(RefCell::new(ack))),
        }
    }

    /// Acknowledge the message, optionally carrying `data` back to the
    /// sender's ack callback.
    ///
    /// With no connection attached the call is a complete no-op: the id is
    /// *not* recorded, so a later retransmit is reprocessed and gets a fresh
    /// chance to be acknowledged.
    pub fn send(&self, data: Option<Value>) {
        match &self.kind {
            SenderKind::Guaranteed { id, core } => {
                let Some(core) = core.upgrade() else { return };
                let conn = core.borrow().conn.clone();
                let Some(conn) = conn else {
                    trace!("ack for {id} dropped: no connection attached");
                    return;
                };
                core.borrow_mut().acked.mark(*id);
                conn.emit(ACK_EVENT, Ack::new(*id, data).to_value(), None);
            }
            SenderKind::Native(slot) => {
                let taken = slot.borrow_mut().take();
                if let Some(ack) = taken {
                    ack(data);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Build the [`RawHandler`](crate::connection::RawHandler) that binds one
/// application listener to a connection.
///
/// Holds only a `Weak` to the context: a wrapper left registered on a stale
/// connection after the facade is dropped degrades to a no-op.
pub(crate) fn wrap(
    core: &Rc<RefCell<Core>>,
    listener: &Rc<RefCell<Listener>>,
) -> crate::connection::RawHandler {
    let core = Rc::downgrade(core);
    let listener = Rc::clone(listener);
    Box::new(move |raw, native| {
        if let Some(core) = core.upgrade() {
            deliver(&core, &listener, raw, native);
        }
    })
}

/// Route one raw incoming value to one listener.
///
/// No borrow of `core` is held while the listener runs, so listeners are
/// free to emit, register, or detach reentrantly.
pub(crate) fn deliver(
    core: &Rc<RefCell<Core>>,
    listener: &Rc<RefCell<Listener>>,
    raw: Value,
    native: Option<AckFn>,
) {
    match Envelope::from_value(&raw) {
        Ok(envelope) => {
            let id = envelope.correlation_id;
            let (duplicate, auto_ack) = {
                let c = core.borrow();
                (c.acked.contains(id), c.auto_ack)
            };
            if duplicate {
                debug!("discarding retransmitted duplicate {id}");
                return;
            }

            let sender = AckSender::guaranteed(id, Rc::downgrade(core));
            (listener.borrow_mut())(envelope.payload, sender.clone(), Some(id));
            if auto_ack {
                sender.send(None);
            }
        }
        Err(err) => {
            if matches!(err, WireError::Malformed(_)) {
                trace!("passing malformed envelope through unchanged: {err}");
            }
            (listener.borrow_mut())(raw, AckSender::native(native), None);
        }
    }
}

//! The public facade: [`GuaranteedSocket`].
//!
//! Composes the pending store, sent-ack registry, transport binding, and
//! event router around one replaceable [`Connection`] handle.
//!
//! # Message lifecycle (guaranteed mode)
//!
//! ```text
//!   emit ──▶ PENDING (sent, awaiting ack) ──ack received──▶ ACKED
//!              │  ▲                                         (removed,
//!   reattach ──┘  │ resent on every attach/reconnect         callback fired)
//!              └──┴────────clear_pending──▶ CLEARED (removed, no callback)
//! ```
//!
//! A pending message survives any number of connection replacements; there
//! is no timeout or retry cap.  The application observes an unacknowledged
//! message only by its callback never firing.
//!
//! # Sharing model
//!
//! All state lives behind one `Rc<RefCell<Core>>` shared with the handlers
//! registered on the transport.  Everything runs on one thread; the only
//! discipline is that no borrow is held across a call into the transport or
//! into application code.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::binding;
use crate::connection::{AckFn, Connection, HandlerId};
use crate::envelope::{Envelope, MessageId};
use crate::pending::{MessageRecord, PendingStore};
use crate::registry::AckRegistry;
use crate::router::{self, AckSender, Listener};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Construction options for [`GuaranteedSocket`].
#[derive(Debug, Clone, Default)]
pub struct SocketConfig {
    /// Acknowledge every delivered guaranteed message automatically, right
    /// after the listener returns, with no data.
    pub auto_ack: bool,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Identity of one listener registration on the facade, for [`off`].
///
/// [`off`]: GuaranteedSocket::off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

/// One application listener, tracked independently of any connection.
pub(crate) struct ListenerRecord {
    pub(crate) token: ListenerToken,
    pub(crate) callback: Rc<RefCell<Listener>>,
    /// Registration on the currently attached connection, if any.
    pub(crate) bound: Option<HandlerId>,
}

/// State shared between the facade and the handlers bound to the transport.
pub(crate) struct Core {
    pub(crate) conn: Option<Rc<dyn Connection>>,
    pub(crate) pending: PendingStore,
    pub(crate) acked: AckRegistry,
    pub(crate) guaranteed: bool,
    pub(crate) auto_ack: bool,
    pub(crate) listeners: HashMap<String, Vec<ListenerRecord>>,
    /// Control-handler registrations (reconnect + ack) on the current
    /// connection.
    pub(crate) control: Vec<(&'static str, HandlerId)>,
    next_token: u64,
}

// ---------------------------------------------------------------------------
// GuaranteedSocket
// ---------------------------------------------------------------------------

/// At-least-once delivery with duplicate suppression over a replaceable
/// event-based connection.
///
/// If the connection drops, it is up to the application to obtain a new one
/// and [`attach`](Self::attach) it; doing so resends every message that has
/// not yet been acknowledged.
pub struct GuaranteedSocket {
    core: Rc<RefCell<Core>>,
}

impl GuaranteedSocket {
    /// Create a socket, optionally attached to an initial connection.
    pub fn new(conn: Option<Rc<dyn Connection>>, config: SocketConfig) -> Self {
        let socket = Self {
            core: Rc::new(RefCell::new(Core {
                conn: None,
                pending: PendingStore::new(),
                acked: AckRegistry::new(),
                guaranteed: true,
                auto_ack: config.auto_ack,
                listeners: HashMap::new(),
                control: Vec::new(),
                next_token: 0,
            })),
        };
        if conn.is_some() {
            binding::attach(&socket.core, conn);
        }
        socket
    }

    /// Replace the underlying connection.
    ///
    /// The previous connection's registrations are always removed first.
    /// `Some(conn)` rebinds every listener and resends all pending messages;
    /// `None` fully detaches without resending.
    pub fn attach(&self, conn: Option<Rc<dyn Connection>>) {
        binding::attach(&self.core, conn);
    }

    /// The currently attached connection, if any.
    pub fn connection(&self) -> Option<Rc<dyn Connection>> {
        self.core.borrow().conn.clone()
    }

    pub fn is_attached(&self) -> bool {
        self.core.borrow().conn.is_some()
    }

    /// Retransmit every pending message over the current connection.
    /// A no-op while detached.
    pub fn resend_pending(&self) {
        binding::resend_pending(&self.core);
    }

    /// Drop every pending message without acknowledgment; their callbacks
    /// never fire.
    pub fn clear_pending(&self) {
        self.core.borrow_mut().pending.clear();
    }

    /// Number of messages awaiting acknowledgment.
    pub fn pending_len(&self) -> usize {
        self.core.borrow().pending.len()
    }

    /// Correlation ids of all pending messages, in no particular order.
    pub fn pending_ids(&self) -> Vec<MessageId> {
        self.core.borrow().pending.ids()
    }

    /// Whether the message with `id` is still awaiting acknowledgment.
    pub fn is_pending(&self, id: MessageId) -> bool {
        self.core.borrow().pending.contains(id)
    }

    /// Toggle guaranteed mode for subsequent emits.  While disabled,
    /// messages are sent raw: no id, no envelope, no tracking.
    pub fn set_guaranteed(&self, enabled: bool) {
        self.core.borrow_mut().guaranteed = enabled;
    }

    /// Emit `payload` under `event`.
    ///
    /// In guaranteed mode the message is tracked and retransmitted on every
    /// reattachment until acknowledged.  Either way, transmission while
    /// detached is silently dropped — a guaranteed message simply stays
    /// pending for the next attach.
    pub fn emit(&self, event: &str, payload: Value) {
        self.send(event, payload, None);
    }

    /// Like [`emit`](Self::emit), with a callback fired when the peer
    /// acknowledges.
    ///
    /// In guaranteed mode the callback fires exactly once, when the ack
    /// frame for this message arrives.  In raw mode it rides the transport's
    /// native reply mechanism instead and carries no redelivery guarantee.
    pub fn emit_with_ack(
        &self,
        event: &str,
        payload: Value,
        ack: impl FnOnce(Option<Value>) + 'static,
    ) {
        self.send(event, payload, Some(Box::new(ack)));
    }

    fn send(&self, event: &str, payload: Value, ack: Option<AckFn>) {
        let guaranteed = self.core.borrow().guaranteed;
        if guaranteed {
            let id = MessageId::fresh();
            let outbound = {
                let mut c = self.core.borrow_mut();
                c.pending.insert(MessageRecord {
                    id,
                    event: event.to_string(),
                    payload: payload.clone(),
                    ack_callback: ack,
                    tx_count: 1,
                });
                c.conn
                    .clone()
                    .map(|conn| (conn, Envelope::new(id, payload).to_value()))
            };
            if let Some((conn, frame)) = outbound {
                conn.emit(event, frame, None);
            }
        } else {
            let conn = self.core.borrow().conn.clone();
            if let Some(conn) = conn {
                conn.emit(event, payload, ack);
            }
        }
    }

    /// Register a listener for `event`.
    ///
    /// The listener is wrapped so that guaranteed messages are unwrapped,
    /// deduplicated, and (optionally) auto-acknowledged before it runs; raw
    /// messages pass through unchanged.  Listeners survive connection
    /// replacement — they are rebound to every newly attached connection —
    /// and may be registered while detached.
    pub fn on(
        &self,
        event: &str,
        listener: impl FnMut(Value, AckSender, Option<MessageId>) + 'static,
    ) -> ListenerToken {
        let callback: Rc<RefCell<Listener>> = Rc::new(RefCell::new(Box::new(listener)));
        let (token, conn) = {
            let mut c = self.core.borrow_mut();
            let token = ListenerToken(c.next_token);
            c.next_token += 1;
            c.listeners
                .entry(event.to_string())
                .or_default()
                .push(ListenerRecord {
                    token,
                    callback: Rc::clone(&callback),
                    bound: None,
                });
            (token, c.conn.clone())
        };

        if let Some(conn) = conn {
            let id = conn.on(event, router::wrap(&self.core, &callback));
            let mut c = self.core.borrow_mut();
            if let Some(record) = c
                .listeners
                .get_mut(event)
                .and_then(|records| records.iter_mut().find(|r| r.token == token))
            {
                record.bound = Some(id);
            }
        }
        token
    }

    /// Remove a listener previously registered with [`on`](Self::on).
    /// Unknown events or tokens are a no-op.
    pub fn off(&self, event: &str, token: ListenerToken) {
        let unbind = {
            let mut c = self.core.borrow_mut();
            let Some(records) = c.listeners.get_mut(event) else {
                return;
            };
            let Some(pos) = records.iter().position(|r| r.token == token) else {
                return;
            };
            let record = records.remove(pos);
            if records.is_empty() {
                c.listeners.remove(event);
            }
            record.bound.map(|id| (c.conn.clone(), id))
        };

        if let Some((Some(conn), id)) = unbind {
            conn.off(event, id);
        }
    }

    /// Disconnect the transport and detach from it.  Pending messages stay
    /// queued for the next attachment.
    pub fn disconnect(&self, graceful: bool) {
        let conn = self.core.borrow().conn.clone();
        if let Some(conn) = conn {
            conn.disconnect(graceful);
        }
        binding::detach(&self.core);
    }

    /// Gracefully disconnect and detach.
    pub fn close(&self) {
        self.disconnect(true);
    }
}

// ---------------------------------------------------------------------------
// Unit tests (facade-level; full scenarios live in tests/delivery.rs)
// ---------------------------------------------------------------------------

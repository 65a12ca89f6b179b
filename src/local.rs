//! In-process loopback transport for tests and the demo binary.
//!
//! Real deployments put a WebSocket or broker client behind the
//! [`Connection`] trait.  To exercise the delivery protocol without a
//! network, [`local_pair`] creates two connected endpoints: a frame emitted
//! on one is delivered to the handlers registered on the other, on the same
//! thread, with a configurable fault model:
//!
//! | Fault        | Description                                             |
//! |--------------|---------------------------------------------------------|
//! | Link loss    | [`sever`] silently drops every frame in either direction|
//! | Reconnect    | [`simulate_reconnect`] fires the transport's reconnect  |
//! |              | signal on an endpoint's own handlers                    |
//!
//! [`sever`]: LocalConn::sever
//! [`simulate_reconnect`]: LocalConn::simulate_reconnect
//!
//! # Dispatch model
//!
//! Deliveries go through a per-endpoint FIFO queue drained by a guarded
//! pump.  An emit issued from inside a handler is enqueued and delivered
//! after the current handler returns, never recursively — handlers on one
//! endpoint run strictly one at a time, matching the cooperative
//! single-threaded model the protocol assumes.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::connection::{AckFn, Connection, HandlerId, RawHandler};
use crate::envelope::RECONNECT_EVENT;

// ---------------------------------------------------------------------------
// Endpoint internals
// ---------------------------------------------------------------------------

/// One queued inbound frame.
struct Delivery {
    event: String,
    payload: Value,
    ack: Option<AckFn>,
}

#[derive(Default)]
struct Inner {
    handlers: HashMap<String, Vec<(HandlerId, Rc<RefCell<RawHandler>>)>>,
    queue: VecDeque<Delivery>,
    pumping: bool,
    next_id: u64,
}

/// Drain `inner`'s delivery queue, invoking matching handlers.
///
/// Reentrant calls (an emit from inside a handler) see `pumping == true`
/// and return immediately; the outer pump picks the new frame up in FIFO
/// order.  No borrow of `inner` is held while a handler runs.
fn pump(inner: &Rc<RefCell<Inner>>) {
    {
        let mut i = inner.borrow_mut();
        if i.pumping {
            return;
        }
        i.pumping = true;
    }

    loop {
        let next = inner.borrow_mut().queue.pop_front();
        let Some(Delivery {
            event,
            payload,
            mut ack,
        }) = next
        else {
            break;
        };

        let handlers: Vec<Rc<RefCell<RawHandler>>> = inner
            .borrow()
            .handlers
            .get(&event)
            .map(|hs| hs.iter().map(|(_, h)| Rc::clone(h)).collect())
            .unwrap_or_default();

        for handler in handlers {
            // The native ack is one-shot: only the first handler gets it.
            (handler.borrow_mut())(payload.clone(), ack.take());
        }
    }

    inner.borrow_mut().pumping = false;
}

// ---------------------------------------------------------------------------
// LocalConn
// ---------------------------------------------------------------------------

/// One endpoint of an in-process connection pair.
pub struct LocalConn {
    inner: Rc<RefCell<Inner>>,
    peer: RefCell<Weak<RefCell<Inner>>>,
    /// Shared by both endpoints; `false` means frames vanish in transit.
    link_up: Rc<Cell<bool>>,
}

impl LocalConn {
    /// Cut the link in both directions.  Frames emitted afterwards are
    /// silently lost, exactly like writes to a dead socket.
    pub fn sever(&self) {
        self.link_up.set(false);
    }

    /// `true` while frames still flow.
    pub fn link_up(&self) -> bool {
        self.link_up.get()
    }

    /// Fire the transport's reconnect signal on this endpoint's handlers,
    /// as a real transport would after transparently re-establishing the
    /// link.
    pub fn simulate_reconnect(&self) {
        self.inner.borrow_mut().queue.push_back(Delivery {
            event: RECONNECT_EVENT.to_string(),
            payload: Value::Null,
            ack: None,
        });
        pump(&self.inner);
    }
}

impl Connection for LocalConn {
    fn emit(&self, event: &str, payload: Value, ack: Option<AckFn>) {
        if !self.link_up.get() {
            return; // lost in transit
        }
        let Some(peer) = self.peer.borrow().upgrade() else {
            return; // peer endpoint dropped
        };
        peer.borrow_mut().queue.push_back(Delivery {
            event: event.to_string(),
            payload,
            ack,
        });
        pump(&peer);
    }

    fn on(&self, event: &str, handler: RawHandler) -> HandlerId {
        let mut inner = self.inner.borrow_mut();
        let id = HandlerId(inner.next_id);
        inner.next_id += 1;
        inner
            .handlers
            .entry(event.to_string())
            .or_default()
            .push((id, Rc::new(RefCell::new(handler))));
        id
    }

    fn off(&self, event: &str, handler: HandlerId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(handlers) = inner.handlers.get_mut(event) {
            handlers.retain(|(id, _)| *id != handler);
            if handlers.is_empty() {
                inner.handlers.remove(event);
            }
        }
    }

    fn disconnect(&self, _graceful: bool) {
        self.link_up.set(false);
    }
}

/// Create a connected endpoint pair with the link up.
pub fn local_pair() -> (Rc<LocalConn>, Rc<LocalConn>) {
    let link_up = Rc::new(Cell::new(true));
    let a = Rc::new(LocalConn {
        inner: Rc::new(RefCell::new(Inner::default())),
        peer: RefCell::new(Weak::new()),
        link_up: Rc::clone(&link_up),
    });
    let b = Rc::new(LocalConn {
        inner: Rc::new(RefCell::new(Inner::default())),
        peer: RefCell::new(Weak::new()),
        link_up,
    });
    *a.peer.borrow_mut() = Rc::downgrade(&b.inner);
    *b.peer.borrow_mut() = Rc::downgrade(&a.inner);
    (a, b)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

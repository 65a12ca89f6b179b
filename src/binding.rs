//! Transport binding: attach/detach lifecycle and resend-on-reattach.
//!
//! The binding owns the protocol's two control registrations on whatever
//! connection is currently attached:
//! - [`RECONNECT_EVENT`] — transport signal that the link came back; triggers
//!   the same full resend as a fresh attach.
//! - [`ACK_EVENT`] — acknowledgment frames from the peer; each one removes
//!   the matching pending record and fires its callback.
//!
//! Binding state machine:
//!
//! ```text
//!   DETACHED ──attach(Some(conn))──▶ ATTACHED   (full resend of pending)
//!      ▲                                │
//!      └── attach(None) / detach ───────┘
//! ```
//!
//! A reconnect signal received while attached re-triggers the resend without
//! a state change.  Detaching never touches the pending store — records stay
//! queued for the next attachment.

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, trace};
use serde_json::Value;

use crate::connection::{Connection, HandlerId};
use crate::envelope::{Ack, Envelope, ACK_EVENT, RECONNECT_EVENT};
use crate::router;
use crate::socket::Core;

/// Attach `conn` as the current connection.
///
/// Always fully detaches the previous connection's registrations first, so
/// nothing can be delivered through a stale handle.  With `Some(conn)` the
/// binding then registers its control handlers, rebinds every application
/// listener, and resends the entire pending store.  `None` detaches without
/// resending.
pub(crate) fn attach(core: &Rc<RefCell<Core>>, conn: Option<Rc<dyn Connection>>) {
    detach(core);

    let Some(conn) = conn else { return };
    core.borrow_mut().conn = Some(Rc::clone(&conn));

    let weak = Rc::downgrade(core);
    let reconnect_id = conn.on(
        RECONNECT_EVENT,
        Box::new(move |_, _| {
            if let Some(core) = weak.upgrade() {
                debug!("reconnect signal: resending pending messages");
                resend_pending(&core);
            }
        }),
    );

    let weak = Rc::downgrade(core);
    let ack_id = conn.on(
        ACK_EVENT,
        Box::new(move |raw, _| {
            if let Some(core) = weak.upgrade() {
                on_ack(&core, raw);
            }
        }),
    );

    {
        let mut c = core.borrow_mut();
        c.control.push((RECONNECT_EVENT, reconnect_id));
        c.control.push((ACK_EVENT, ack_id));
    }

    rebind_listeners(core, &conn);
    resend_pending(core);
}

/// Unregister the control handlers and every bound application listener from
/// the current connection, then forget the handle.  Pending is untouched.
pub(crate) fn detach(core: &Rc<RefCell<Core>>) {
    let (conn, registrations) = {
        let mut c = core.borrow_mut();
        let conn = c.conn.take();
        let mut regs: Vec<(String, HandlerId)> = c
            .control
            .drain(..)
            .map(|(event, id)| (event.to_string(), id))
            .collect();
        for (event, records) in c.listeners.iter_mut() {
            for record in records.iter_mut() {
                if let Some(id) = record.bound.take() {
                    regs.push((event.clone(), id));
                }
            }
        }
        (conn, regs)
    };

    if let Some(conn) = conn {
        for (event, id) in registrations {
            conn.off(&event, id);
        }
    }
}

/// Register a wrapper for every known listener record on `conn`.
fn rebind_listeners(core: &Rc<RefCell<Core>>, conn: &Rc<dyn Connection>) {
    let snapshot: Vec<_> = core
        .borrow()
        .listeners
        .iter()
        .flat_map(|(event, records)| {
            records
                .iter()
                .map(|r| (event.clone(), r.token, Rc::clone(&r.callback)))
                .collect::<Vec<_>>()
        })
        .collect();

    for (event, token, callback) in snapshot {
        let id = conn.on(&event, router::wrap(core, &callback));
        let mut c = core.borrow_mut();
        if let Some(record) = c
            .listeners
            .get_mut(&event)
            .and_then(|records| records.iter_mut().find(|r| r.token == token))
        {
            record.bound = Some(id);
        }
    }
}

/// Retransmit every pending record over the current connection.
///
/// Each record is enveloped and emitted exactly once per call, in no
/// particular order.  A no-op while detached.
pub(crate) fn resend_pending(core: &Rc<RefCell<Core>>) {
    let (conn, frames) = {
        let mut c = core.borrow_mut();
        let Some(conn) = c.conn.clone() else { return };
        let frames: Vec<(String, Value)> = c
            .pending
            .records_mut()
            .map(|record| {
                record.tx_count += 1;
                (
                    record.event.clone(),
                    Envelope::new(record.id, record.payload.clone()).to_value(),
                )
            })
            .collect();
        (conn, frames)
    };

    if !frames.is_empty() {
        debug!("resending {} pending message(s)", frames.len());
    }
    for (event, frame) in frames {
        conn.emit(&event, frame, None);
    }
}

/// Handle one incoming acknowledgment frame.
///
/// Unknown or already-removed ids and unparsable frames are ignored; a
/// matching record is removed and its callback fired with the ack's data.
pub(crate) fn on_ack(core: &Rc<RefCell<Core>>, raw: Value) {
    let ack = match Ack::from_value(&raw) {
        Ok(ack) => ack,
        Err(err) => {
            debug!("ignoring unparsable ack frame: {err}");
            return;
        }
    };

    let record = core.borrow_mut().pending.remove(ack.id);
    match record {
        Some(record) => {
            debug!(
                "ack for {} after {} transmission(s)",
                record.id, record.tx_count
            );
            if let Some(callback) = record.ack_callback {
                callback(ack.data);
            }
        }
        None => trace!("ack for unknown or already-acked id {}", ack.id),
    }
}

//! The transport abstraction: an opaque, named-event, bidirectional channel.
//!
//! [`Connection`] is the seam between the guaranteed-delivery protocol and
//! whatever actually moves bytes — a WebSocket wrapper, a message broker
//! client, or the in-process loopback in [`crate::local`].  The protocol
//! never establishes or repairs connections itself: when one drops, the
//! owning application obtains a replacement and hands it to
//! [`crate::socket::GuaranteedSocket::attach`].
//!
//! Contract for implementors:
//! - `emit` is fire-and-forget.  A dead or detached transport drops the
//!   frame silently; it never errors.
//! - Handlers registered with `on` are invoked synchronously, one at a time,
//!   on the caller's thread (single-threaded cooperative model).  An
//!   implementation must tolerate `emit`/`on`/`off` being called from inside
//!   a handler.
//! - `off` with an unknown id is a no-op.

use serde_json::Value;

/// One-shot acknowledgment callback, carrying optional application data.
///
/// Used both for the transport's native ack passthrough (non-guaranteed
/// sends) and for the per-message ack callbacks stored in the pending store.
pub type AckFn = Box<dyn FnOnce(Option<Value>)>;

/// Handler registered directly on a [`Connection`].
///
/// Receives the raw incoming value and, when the transport supports reply
/// passthrough, a native acknowledgment callback.
pub type RawHandler = Box<dyn FnMut(Value, Option<AckFn>)>;

/// Identity of one handler registration on one connection, for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u64);

/// A bidirectional, named-event messaging channel.
///
/// All methods take `&self`; implementations use interior mutability so that
/// handles can be shared (`Rc<dyn Connection>`) across the binding layer and
/// application code.
pub trait Connection {
    /// Send `payload` under `event`.  `ack`, when given, is the transport's
    /// native reply mechanism; implementations without one may drop it.
    fn emit(&self, event: &str, payload: Value, ack: Option<AckFn>);

    /// Register a handler for `event`; returns its identity for [`off`].
    ///
    /// [`off`]: Connection::off
    fn on(&self, event: &str, handler: RawHandler) -> HandlerId;

    /// Remove a previously registered handler.  Unknown ids are ignored.
    fn off(&self, event: &str, handler: HandlerId);

    /// Tear the connection down.  `graceful` lets the transport flush or
    /// negotiate closure; the protocol passes the caller's intent through.
    fn disconnect(&self, graceful: bool);
}

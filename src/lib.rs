//! `guaranteed-socket` — at-least-once delivery with duplicate suppression
//! over a replaceable, event-based connection.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │ emit / on / off / attach
//!  ┌───▼───────────────────────────────┐
//!  │         GuaranteedSocket          │  facade
//!  │   ├── PendingStore  (unacked)     │
//!  │   ├── AckRegistry   (dedup)       │
//!  │   ├── binding  (attach/resend)    │
//!  │   └── router   (unwrap/ack)       │
//!  └───┬───────────────────────────────┘
//!      │ enveloped frames + gd_ack control event
//!  ┌───▼───────┐
//!  │ Connection│  (trait; replaced by the application after a drop)
//!  └───────────┘
//! ```
//!
//! The underlying connection can be silently dropped at any time; recovery
//! is the application's job — obtain a new connection and hand it to
//! [`GuaranteedSocket::attach`], which resends every message that has not
//! received an acknowledgment.  Receivers suppress the duplicates that
//! arise when an acknowledgment, not the message, was lost.
//!
//! Each module has a single responsibility:
//! - [`envelope`]   — wire format (envelope/ack frames, correlation ids)
//! - [`pending`]    — store of sent-but-unacknowledged records
//! - [`registry`]   — receiver-side set of already-acked ids
//! - [`connection`] — the transport trait the protocol runs over
//! - [`binding`]    — attach/detach lifecycle and resend-on-reattach
//! - [`router`]     — envelope unwrapping, dedup, auto-ack
//! - [`socket`]     — the public facade
//! - [`local`]      — in-process loopback transport for tests and the demo

pub mod connection;
pub mod envelope;
pub mod local;
pub mod pending;
pub mod registry;
pub mod socket;

mod binding;
mod router;

pub use connection::{AckFn, Connection, HandlerId, RawHandler};
pub use envelope::{Ack, Envelope, MessageId, WireError, ACK_EVENT, RECONNECT_EVENT};
pub use router::{AckSender, Listener};
pub use socket::{GuaranteedSocket, ListenerToken, SocketConfig};

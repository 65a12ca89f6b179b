//! Integration tests for the guaranteed-delivery protocol.
//!
//! Each test wires two facades to the two ends of an in-process loopback
//! pair.  Link failures are injected by severing the pair (frames vanish in
//! transit, like writes to a dead socket); recovery always goes through the
//! application attaching a fresh pair, which is the protocol's only repair
//! mechanism.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::{json, Value};

use guaranteed_socket::local::{local_pair, LocalConn};
use guaranteed_socket::{Connection, GuaranteedSocket, SocketConfig};

/// Two facades attached to the ends of a fresh loopback pair.
fn attached_pair(
    client_cfg: SocketConfig,
    server_cfg: SocketConfig,
) -> (GuaranteedSocket, GuaranteedSocket, Rc<LocalConn>, Rc<LocalConn>) {
    let (c, s) = local_pair();
    let client = GuaranteedSocket::new(Some(Rc::clone(&c) as Rc<dyn Connection>), client_cfg);
    let server = GuaranteedSocket::new(Some(Rc::clone(&s) as Rc<dyn Connection>), server_cfg);
    (client, server, c, s)
}

fn counter() -> (Rc<Cell<u32>>, Rc<Cell<u32>>) {
    let c = Rc::new(Cell::new(0u32));
    (Rc::clone(&c), c)
}

// ---------------------------------------------------------------------------
// Test 1: normal bidirectional exchange (4 listener invocations)
// ---------------------------------------------------------------------------

#[test]
fn sends_and_receives_messages_normally() {
    let (client, server, _c, _s) = attached_pair(SocketConfig::default(), SocketConfig::default());
    let server = Rc::new(server);
    let (events, events_total) = counter();

    {
        let events = Rc::clone(&events);
        let echo = Rc::clone(&server);
        server.on("event1", move |payload, _ack, id| {
            events.set(events.get() + 1);
            assert!(id.is_some(), "guaranteed messages carry their id");
            assert_eq!(payload["hello"], json!("world"));
            assert_eq!(payload["number"], json!(1));
            assert_eq!(payload["boolean"], json!(true));
            echo.emit("event1", json!({"hello": "world", "number": 1, "boolean": true}));
            echo.emit("event2", json!({"hello2": "world2"}));
        });
    }
    {
        let events = Rc::clone(&events);
        server.on("event2", move |payload, _ack, _id| {
            events.set(events.get() + 1);
            assert_eq!(payload["hello2"], json!("world2"));
        });
    }
    {
        let events = Rc::clone(&events);
        client.on("event1", move |payload, _ack, _id| {
            events.set(events.get() + 1);
            assert_eq!(payload["hello"], json!("world"));
        });
    }
    {
        let events = Rc::clone(&events);
        client.on("event2", move |payload, _ack, _id| {
            events.set(events.get() + 1);
            assert_eq!(payload["hello2"], json!("world2"));
        });
    }

    client.emit("event1", json!({"hello": "world", "number": 1, "boolean": true}));
    client.emit("event2", json!({"hello2": "world2"}));

    assert_eq!(events_total.get(), 4);
}

// ---------------------------------------------------------------------------
// Test 2: delivery resumes after a mid-stream disconnect
// ---------------------------------------------------------------------------

#[test]
fn sends_and_receives_messages_after_disconnect() {
    let (client, server, _c1, _s1) =
        attached_pair(SocketConfig::default(), SocketConfig::default());
    let server = Rc::new(server);
    let (sevents, sevents_total) = counter();
    let (cevents, cevents_total) = counter();

    {
        let sevents = Rc::clone(&sevents);
        let this = Rc::clone(&server);
        server.on("message", move |payload, ack, _id| {
            sevents.set(sevents.get() + 1);
            if sevents.get() == 2 {
                // Terminate the connection after the second message without
                // acking it, so it must be delivered again once a new
                // connection is up.
                this.disconnect(true);
                return;
            }
            this.emit("message", payload);
            ack.send(None);
        });
    }
    {
        let cevents = Rc::clone(&cevents);
        client.on("message", move |_payload, ack, _id| {
            cevents.set(cevents.get() + 1);
            ack.send(None);
        });
    }

    client.emit("message", json!("hello server 1"));
    client.emit("message", json!("hello server 2"));
    client.emit("message", json!("hello server 3"));

    // Message 2 killed the connection before being acked; message 3 was
    // lost in transit entirely.
    assert_eq!(sevents_total.get(), 2);
    assert_eq!(cevents_total.get(), 1);
    assert_eq!(client.pending_len(), 2);

    // The application supplies a replacement connection to both sides.
    let (c2, s2) = local_pair();
    server.attach(Some(s2 as Rc<dyn Connection>));
    client.attach(Some(c2 as Rc<dyn Connection>));

    // The server received the second message twice; the client saw exactly
    // three logical deliveries back.
    assert_eq!(sevents_total.get(), 4);
    assert_eq!(cevents_total.get(), 3);
    assert_eq!(client.pending_len(), 0);
    assert_eq!(server.pending_len(), 0);
}

// ---------------------------------------------------------------------------
// Test 3: lost ack — retransmitted duplicate is discarded at the receiver
// ---------------------------------------------------------------------------

#[test]
fn retransmit_after_lost_ack_is_suppressed() {
    let (client, server, _c1, s1) = attached_pair(SocketConfig::default(), SocketConfig::default());
    let (received, received_total) = counter();
    let acked = Rc::new(Cell::new(false));

    {
        let received = Rc::clone(&received);
        let link = Rc::clone(&s1);
        server.on("event1", move |_payload, ack, _id| {
            received.set(received.get() + 1);
            // The link dies while the ack is in flight: the ack is recorded
            // locally but never reaches the sender.
            link.sever();
            ack.send(None);
        });
    }

    let flag = Rc::clone(&acked);
    client.emit_with_ack("event1", json!("once"), move |_| flag.set(true));

    assert_eq!(received_total.get(), 1);
    assert_eq!(client.pending_len(), 1);
    assert!(!acked.get());

    // Replacement connection: the pending message is retransmitted, found
    // in the server's sent-ack registry, and discarded without re-invoking
    // the listener.
    let (c2, s2) = local_pair();
    server.attach(Some(s2 as Rc<dyn Connection>));
    client.attach(Some(c2 as Rc<dyn Connection>));

    assert_eq!(received_total.get(), 1, "duplicate must not reach the app");
    assert_eq!(client.pending_len(), 1, "the lost ack leaves it pending");
    assert!(!acked.get());
}

// ---------------------------------------------------------------------------
// Test 4: unacked messages are resent exactly once per attachment
// ---------------------------------------------------------------------------

#[test]
fn pending_message_resent_once_per_attach() {
    let client = GuaranteedSocket::new(None, SocketConfig::default());
    client.emit("event1", json!("stubborn"));
    assert_eq!(client.pending_len(), 1);

    for _ in 0..3 {
        let (c, s) = local_pair();
        let (frames, frames_total) = counter();
        s.on(
            "event1",
            Box::new(move |_, _| frames.set(frames.get() + 1)),
        );

        client.attach(Some(c as Rc<dyn Connection>));

        assert_eq!(frames_total.get(), 1, "one retransmission per attach");
        assert_eq!(client.pending_len(), 1, "still pending: nobody acks");
    }
}

// ---------------------------------------------------------------------------
// Test 5: resend_pending is idempotent on the store, not on the wire
// ---------------------------------------------------------------------------

#[test]
fn resend_pending_retransmits_without_duplicating_records() {
    let (client, _server, _c, s) = attached_pair(SocketConfig::default(), SocketConfig::default());
    let (frames, frames_total) = counter();
    s.on(
        "event1",
        Box::new(move |_, _| frames.set(frames.get() + 1)),
    );

    client.emit("event1", json!(1));
    assert_eq!(frames_total.get(), 1);

    client.resend_pending();
    client.resend_pending();

    assert_eq!(frames_total.get(), 3);
    assert_eq!(client.pending_len(), 1);
    assert_eq!(client.pending_ids().len(), 1);
}

// ---------------------------------------------------------------------------
// Test 6: a valid ack removes the record and fires its callback once
// ---------------------------------------------------------------------------

#[test]
fn ack_fires_callback_exactly_once_with_data() {
    let (client, server, _c, _s) = attached_pair(SocketConfig::default(), SocketConfig::default());
    let (fired, fired_total) = counter();
    let seen = Rc::new(RefCell::new(None));

    server.on("event1", move |_payload, ack, _id| {
        // Acking twice exercises idempotent removal on the sender side.
        ack.send(Some(json!({"status": "ok"})));
        ack.send(Some(json!({"status": "again"})));
    });

    let data = Rc::clone(&seen);
    client.emit_with_ack("event1", json!("payload"), move |reply| {
        fired.set(fired.get() + 1);
        *data.borrow_mut() = reply;
    });

    assert_eq!(fired_total.get(), 1);
    assert_eq!(*seen.borrow(), Some(json!({"status": "ok"})));
    assert_eq!(client.pending_len(), 0);
}

// ---------------------------------------------------------------------------
// Test 7: transport reconnect signal triggers a full resend
// ---------------------------------------------------------------------------

#[test]
fn reconnect_signal_resends_pending() {
    let (client, _server, c, s) = attached_pair(SocketConfig::default(), SocketConfig::default());
    let (frames, frames_total) = counter();
    s.on(
        "event1",
        Box::new(move |_, _| frames.set(frames.get() + 1)),
    );

    client.emit("event1", json!(1));
    assert_eq!(frames_total.get(), 1);

    c.simulate_reconnect();
    assert_eq!(frames_total.get(), 2);
    assert_eq!(client.pending_len(), 1);
}

// ---------------------------------------------------------------------------
// Test 8: non-guaranteed mode bypasses tracking and enveloping
// ---------------------------------------------------------------------------

#[test]
fn raw_mode_sends_untracked_and_unwrapped() {
    let (client, server, _c, s) = attached_pair(SocketConfig::default(), SocketConfig::default());
    let (seen_raw, seen_raw_total) = counter();

    // Watch the wire: the payload must go out unwrapped.
    let wire = Rc::new(RefCell::new(Vec::<Value>::new()));
    {
        let wire = Rc::clone(&wire);
        s.on(
            "event1",
            Box::new(move |payload, _| wire.borrow_mut().push(payload)),
        );
    }
    {
        let seen_raw = Rc::clone(&seen_raw);
        server.on("event1", move |payload, _ack, id| {
            seen_raw.set(seen_raw.get() + 1);
            assert_eq!(id, None, "raw messages carry no correlation id");
            assert_eq!(payload, json!({"x": 1}));
        });
    }

    client.set_guaranteed(false);
    client.emit("event1", json!({"x": 1}));

    assert_eq!(seen_raw_total.get(), 1);
    assert_eq!(client.pending_len(), 0);
    assert_eq!(*wire.borrow(), vec![json!({"x": 1})]);
}

#[test]
fn raw_mode_uses_native_ack_passthrough() {
    let (client, server, _c, _s) = attached_pair(SocketConfig::default(), SocketConfig::default());

    server.on("ping", move |_payload, ack, _id| {
        ack.send(Some(json!("pong")));
    });

    let reply = Rc::new(RefCell::new(None));
    let got = Rc::clone(&reply);
    client.set_guaranteed(false);
    client.emit_with_ack("ping", json!(0), move |data| *got.borrow_mut() = data);

    assert_eq!(*reply.borrow(), Some(json!("pong")));
    assert_eq!(client.pending_len(), 0);
}

#[test]
fn guaranteed_toggle_applies_per_emit() {
    let (client, _server, _c, _s) = attached_pair(SocketConfig::default(), SocketConfig::default());

    client.emit("event1", json!(1));
    client.set_guaranteed(false);
    client.emit("event1", json!(2));
    client.set_guaranteed(true);
    client.emit("event1", json!(3));

    assert_eq!(client.pending_len(), 2);
}

// ---------------------------------------------------------------------------
// Test 9: auto-ack acknowledges right after delivery
// ---------------------------------------------------------------------------

#[test]
fn auto_ack_acknowledges_after_delivery() {
    let (client, server, _c, _s) =
        attached_pair(SocketConfig::default(), SocketConfig { auto_ack: true });
    let (delivered, delivered_total) = counter();

    let count = Rc::clone(&delivered);
    server.on("event1", move |_payload, _ack, _id| {
        // Listener never acks; auto-ack mode does it.
        count.set(count.get() + 1);
    });

    let (acks, acks_total) = counter();
    let count = Rc::clone(&acks);
    client.emit_with_ack("event1", json!("auto"), move |_| count.set(count.get() + 1));

    assert_eq!(delivered_total.get(), 1);
    assert_eq!(acks_total.get(), 1);
    assert_eq!(client.pending_len(), 0);
}

// ---------------------------------------------------------------------------
// Test 10: malformed envelopes pass through unchanged
// ---------------------------------------------------------------------------

#[test]
fn malformed_envelope_passes_through() {
    let (_client, server, c, _s) = attached_pair(SocketConfig::default(), SocketConfig::default());
    let seen = Rc::new(RefCell::new(Vec::<(Value, bool)>::new()));

    let log = Rc::clone(&seen);
    server.on("event1", move |payload, _ack, id| {
        log.borrow_mut().push((payload, id.is_some()));
    });

    // Marker present but unparsable id: tolerated, passed through raw.
    let bad = json!({"correlationId": "not-a-uuid", "payload": "p"});
    c.emit("event1", bad.clone(), None);
    // No marker at all: an ordinary raw message.
    c.emit("event1", json!({"plain": true}), None);
    c.emit("event1", json!("just a string"), None);

    let seen = seen.borrow();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], (bad, false));
    assert_eq!(seen[1], (json!({"plain": true}), false));
    assert_eq!(seen[2], (json!("just a string"), false));
}

// ---------------------------------------------------------------------------
// Test 11: listener removal and detach stop delivery
// ---------------------------------------------------------------------------

#[test]
fn off_stops_delivery() {
    let (client, server, _c, _s) = attached_pair(SocketConfig::default(), SocketConfig::default());
    let (hits, hits_total) = counter();

    let count = Rc::clone(&hits);
    let token = server.on("event1", move |_, _, _| count.set(count.get() + 1));

    client.emit("event1", json!(1));
    server.off("event1", token);
    client.emit("event1", json!(2));

    assert_eq!(hits_total.get(), 1);
}

#[test]
fn detached_receiver_gets_nothing() {
    let (client, server, _c, _s) = attached_pair(SocketConfig::default(), SocketConfig::default());
    let (hits, hits_total) = counter();

    let count = Rc::clone(&hits);
    server.on("event1", move |_, _, _| count.set(count.get() + 1));

    server.attach(None);
    client.emit("event1", json!(1));

    assert_eq!(hits_total.get(), 0);
    assert_eq!(client.pending_len(), 1);
}

// ---------------------------------------------------------------------------
// Test 12: clear_pending discards silently
// ---------------------------------------------------------------------------

#[test]
fn clear_pending_never_fires_callbacks() {
    let client = GuaranteedSocket::new(None, SocketConfig::default());
    let fired = Rc::new(Cell::new(false));

    let flag = Rc::clone(&fired);
    client.emit_with_ack("event1", json!(1), move |_| flag.set(true));
    assert_eq!(client.pending_len(), 1);

    client.clear_pending();
    assert_eq!(client.pending_len(), 0);
    assert!(!fired.get());

    // A later attach must not resurrect the cleared message.
    let (c, s) = local_pair();
    let (frames, frames_total) = counter();
    s.on("event1", Box::new(move |_, _| frames.set(frames.get() + 1)));
    client.attach(Some(c as Rc<dyn Connection>));
    assert_eq!(frames_total.get(), 0);
}

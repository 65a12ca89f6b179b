//! Entry point for `guaranteed-socket`.
//!
//! Runs a self-contained loopback demonstration: a client sends guaranteed
//! messages to a server over an in-process connection pair, the link dies
//! mid-stream, and a replacement connection is attached to both sides.  The
//! pending messages are resent and every one ends up acknowledged, with the
//! interrupted message received twice by the server (at-least-once).
//!
//! All protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, argument parsing) and the demo script.

use std::cell::Cell;
use std::rc::Rc;

use anyhow::ensure;
use clap::Parser;
use serde_json::json;

use guaranteed_socket::local::local_pair;
use guaranteed_socket::{Connection, GuaranteedSocket, SocketConfig};

/// Guaranteed-delivery demo over an in-process lossy link.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Number of guaranteed messages to send.
    #[arg(short, long, default_value_t = 5)]
    messages: u32,

    /// Sever the link when this message arrives at the server, before it is
    /// acknowledged.
    #[arg(long, default_value_t = 3)]
    drop_at: u32,
}

fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    ensure!(
        (1..=cli.messages).contains(&cli.drop_at),
        "--drop-at must be between 1 and --messages"
    );

    let (c1, s1) = local_pair();
    let client = GuaranteedSocket::new(
        Some(Rc::clone(&c1) as Rc<dyn Connection>),
        SocketConfig::default(),
    );
    let server = GuaranteedSocket::new(
        Some(Rc::clone(&s1) as Rc<dyn Connection>),
        SocketConfig::default(),
    );

    let arrivals = Rc::new(Cell::new(0u32));
    let acked = Rc::new(Cell::new(0u32));

    {
        let arrivals = Rc::clone(&arrivals);
        let drop_at = cli.drop_at;
        let link = Rc::clone(&s1);
        server.on("greeting", move |payload, ack, _id| {
            arrivals.set(arrivals.get() + 1);
            if arrivals.get() == drop_at {
                log::warn!("link died before {payload} was acknowledged");
                link.sever();
                return;
            }
            log::info!("server received {payload}");
            ack.send(Some(json!({"seen": arrivals.get()})));
        });
    }

    for seq in 1..=cli.messages {
        let acked = Rc::clone(&acked);
        client.emit_with_ack("greeting", json!({ "seq": seq }), move |data| {
            acked.set(acked.get() + 1);
            log::info!("message {seq} acknowledged with {data:?}");
        });
    }

    log::info!(
        "link dropped: {} message(s) still pending",
        client.pending_len()
    );

    // The application supplies a replacement connection; attaching it
    // resends everything that never got an ack.
    let (c2, s2) = local_pair();
    server.attach(Some(s2 as Rc<dyn Connection>));
    client.attach(Some(c2 as Rc<dyn Connection>));

    println!(
        "sent {}, acknowledged {}, server arrivals {} (message {} delivered twice), pending {}",
        cli.messages,
        acked.get(),
        arrivals.get(),
        cli.drop_at,
        client.pending_len()
    );
    ensure!(acked.get() == cli.messages, "not every message was acked");
    ensure!(client.pending_len() == 0, "pending store should be empty");

    Ok(())
}

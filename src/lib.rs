//! This crate implements the ring maintenance and lookup core of a
//! [Chord][w:chord] distributed hash table overlay.
//!
//! # Introduction
//!
//! Every participating node occupies a position on a logical ring of 2^32
//! identifiers, derived by hashing its own address. A node is responsible
//! for the keys between its predecessor's position and its own, and the
//! overlay cooperatively answers the question "which node is responsible
//! for key k?" in O(log N) hops. To do so every node maintains a pointer to
//! its predecessor and successor, a warm replacement for the successor, and
//! a finger table of 32 shortcuts at exponentially spaced offsets.
//!
//! The crate covers ring arithmetic, the routing table, the iterative
//! lookup engine, joining an existing ring, and the failure detection and
//! repair path that restores routing state when the immediate successor
//! departs. Storing application data, replication and data migration are
//! outside its scope; the `search_query` command only exposes a small local
//! debugging store.
//!
//! # Process Architecture
//!
//! Peers talk to each other over a text-line TCP protocol, using a fresh
//! connection per message exchange. A dedicated thread accepts inbound
//! connections and hands each one to a thread pool worker. One further
//! thread probes the successor in regular intervals and repairs the ring
//! when the probe fails; the join flow runs once on the startup thread.
//!
//! All routing state lives in a single [`RoutingTable`] behind one
//! process-wide mutex. A worker holds the mutex for the entire handling of
//! one request, so handlers always observe a consistent snapshot and all
//! state transitions of one node are totally ordered. Requests issued while
//! holding the mutex only ever target other nodes, which keeps the message
//! topology acyclic within a handler.
//!
//! [w:chord]: https://en.wikipedia.org/wiki/Chord_(peer-to-peer)
//! [`RoutingTable`]: routing/struct.RoutingTable.html

use crate::config::Config;
use crate::handler::P2PHandler;
use crate::network::Server;
use crate::routing::{Node, RoutingTable};
use crate::stabilization::{Bootstrap, KeepAlive};
use crate::storage::Storage;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::thread;

pub mod chord;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod network;
pub mod procedures;
pub mod routing;
pub mod stabilization;
pub mod storage;

pub type Result<T> = std::result::Result<T, Box<dyn Error>>;

/// Runs a node until its server thread ends.
///
/// `host` is the address under which other peers reach this node; it flows
/// into the node's ring position and is sent along in every node triple.
/// Without a bootstrap address a fresh singleton ring is created, otherwise
/// the node joins the ring of the given peer.
pub fn run(config: Config, host: &str, port: u16, bootstrap: Option<(String, u16)>) -> Result<()> {
    let current = Node::new(host, port);

    match bootstrap {
        None => run_new_ring(config, current, port),
        Some((boot_host, boot_port)) => {
            let boot_node = Node::new(&boot_host, boot_port);
            run_join(config, current, port, boot_node)
        }
    }
}

/// Creates a fresh singleton ring.
fn run_new_ring(config: Config, current: Node, port: u16) -> Result<()> {
    log::info!("Creating new Chord ring as {}", current);

    let routing = Arc::new(Mutex::new(RoutingTable::singleton(current)));

    let server = serve(&config, &routing, Storage::with_samples(), port)?;
    announce(&routing);

    KeepAlive::new(Arc::clone(&routing), config.timeout_ms, config.keep_alive_secs).spawn();

    server.join().map_err(|_| "server thread panicked")?;

    Ok(())
}

/// Joins the ring of the given bootstrap peer.
fn run_join(config: Config, current: Node, port: u16, boot_node: Node) -> Result<()> {
    log::info!("Joining the Chord ring via {} as {}", boot_node, current);

    let bootstrap = Bootstrap::new(current, boot_node, config.timeout_ms);
    let routing = Arc::new(Mutex::new(bootstrap.initial_table()?));

    // the server must accept connections before the fingers are built:
    // the announcements sent below make peers call back right away
    let server = serve(&config, &routing, Storage::empty(), port)?;

    bootstrap.build_fingers(&routing)?;
    bootstrap.update_peers(&routing)?;
    announce(&routing);

    KeepAlive::new(Arc::clone(&routing), config.timeout_ms, config.keep_alive_secs).spawn();

    server.join().map_err(|_| "server thread panicked")?;

    Ok(())
}

fn serve(
    config: &Config,
    routing: &Arc<Mutex<RoutingTable>>,
    storage: Storage,
    port: u16,
) -> Result<thread::JoinHandle<()>> {
    let handler = P2PHandler::new(Arc::clone(routing), storage, config.timeout_ms);
    let server = Server::new(Box::new(handler));

    Ok(server.listen(("0.0.0.0", port), config.workers)?)
}

fn announce(routing: &Arc<Mutex<RoutingTable>>) {
    let table = routing.lock().unwrap();

    log::info!("You are listening on port {}", table.current().port);
    log::info!("Your position is {}", table.current().id);
    log::info!("Your predecessor is {}", table.predecessor());
    log::info!("Your successor is {}", table.successor());
}

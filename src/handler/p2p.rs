//! Dispatch of inbound peer-to-peer requests.

use crate::chord::Chord;
use crate::message::Message;
use crate::network::{Connection, ServerHandler};
use crate::procedures::Procedures;
use crate::routing::identifier::KEY_BITS;
use crate::routing::RoutingTable;
use crate::storage::Storage;
use std::error::Error;
use std::io;
use std::sync::{Arc, Mutex};

/// Handler for peer-to-peer requests
///
/// One request is handled at a time: the worker acquires the routing table
/// lock right after the request has been read and releases it at handler
/// exit, so every handler observes a consistent snapshot of the routing
/// state. Outbound calls issued while holding the lock only ever target
/// other nodes, which keeps the request topology acyclic on the local node.
pub struct P2PHandler {
    routing: Arc<Mutex<RoutingTable>>,
    storage: Mutex<Storage>,
    procedures: Procedures,
}

impl P2PHandler {
    /// Creates a new `P2PHandler` instance for the shared routing table.
    pub fn new(routing: Arc<Mutex<RoutingTable>>, storage: Storage, timeout: u64) -> Self {
        Self {
            routing,
            storage: Mutex::new(storage),
            procedures: Procedures::new(timeout),
        }
    }

    fn handle_request(&self, mut con: Connection) -> crate::Result<()> {
        let msg = con.receive()?;

        log::debug!("Received request {:?}", msg);

        let mut table = self.routing.lock().unwrap();

        match msg {
            Message::FetchSuccessor => {
                let successor = table.successor().clone();
                con.send_node(&successor)?;
            }
            Message::FetchPredecessor => {
                let predecessor = table.predecessor().clone();
                con.send_node(&predecessor)?;
            }
            Message::QuerySuccessor(key) => {
                let successor =
                    Chord::new(&mut *table, &self.procedures).find_successor(key)?;

                log::info!("Successor of key {} is {}", key, successor);
                con.send_node(&successor)?;
            }
            Message::QueryPredecessor(key) => {
                let predecessor =
                    Chord::new(&mut *table, &self.procedures).find_predecessor(key)?;

                log::info!("Predecessor of key {} is {}", key, predecessor);
                con.send_node(&predecessor)?;
            }
            Message::QueryClosestFinger(key) => {
                let finger =
                    Chord::new(&mut *table, &self.procedures).closest_preceding_finger(key);

                con.send_node(&finger)?;
            }
            Message::UpdateSuccessor(node) => {
                log::info!("New successor {}", node);
                Chord::new(&mut *table, &self.procedures).adopt_successor(node)?;
            }
            Message::UpdatePredecessor(node) => {
                log::info!("New predecessor {}", node);
                table.set_predecessor(node);
            }
            Message::UpdateFingerTable(node, index) => {
                if index >= KEY_BITS {
                    log::warn!("Ignoring finger update with index {}", index);
                    return Ok(());
                }

                Chord::new(&mut *table, &self.procedures).update_finger_table(&node, index)?;
            }
            Message::RemoveNode {
                old,
                index,
                replace,
            } => {
                if index >= KEY_BITS {
                    log::warn!("Ignoring node removal with index {}", index);
                    return Ok(());
                }

                Chord::new(&mut *table, &self.procedures).remove_node(&old, index, &replace)?;
            }
            Message::SearchQuery(search_key) => {
                let found = self.storage.lock().unwrap().contains(&search_key);

                log::info!(
                    "Search for key `{}`: {}",
                    search_key,
                    if found { "found" } else { "not found" }
                );

                con.send_line(if found {
                    "Search key found."
                } else {
                    "Not found."
                })?;
            }
            Message::PrintTable => {
                log::info!("Routing table of {}", table.current());
                log::info!("Predecessor: {}", table.predecessor());
                log::info!("Second successor: {}", table.second_successor());
                for index in 0..KEY_BITS {
                    log::info!("Finger {}: {}", index, table.finger(index));
                }
            }
            Message::Ping => {
                log::debug!("Received ping");
            }
        }

        Ok(())
    }

    fn handle_error(&self, error: &dyn Error) {
        log::error!("Error in P2PHandler: {}", error)
    }
}

impl ServerHandler for P2PHandler {
    fn handle_connection(&self, connection: Connection) {
        if let Err(err) = self.handle_request(connection) {
            self.handle_error(&*err);
        }
    }

    fn handle_error(&self, error: io::Error) {
        self.handle_error(&error)
    }
}

//! Outbound remote calls, one procedure per wire command.
//!
//! Every procedure opens a fresh [`Connection`] to the target node, sends
//! one request and, where the command has a response, reads it back. The
//! procedures never dispatch to the local node; deciding whether a target
//! is the local node and computing the answer locally is the business of
//! the [`Chord`] engine.
//!
//! A procedure that cannot reach its target surfaces the transport error to
//! the caller and nothing else: lookups are not retried here, and repairing
//! the ring after a failure belongs to the keep-alive task alone.
//!
//! [`Connection`]: ../network/struct.Connection.html
//! [`Chord`]: ../chord/struct.Chord.html

use crate::message::Message;
use crate::network::Connection;
use crate::routing::identifier::Identifier;
use crate::routing::Node;

pub struct Procedures {
    timeout: u64,
}

impl Procedures {
    pub fn new(timeout: u64) -> Self {
        Self { timeout }
    }

    /// Asks `target` for its successor pointer.
    pub fn fetch_successor(&self, target: &Node) -> crate::Result<Node> {
        self.fetch_query(target, Message::FetchSuccessor)
    }

    /// Asks `target` for its predecessor pointer.
    pub fn fetch_predecessor(&self, target: &Node) -> crate::Result<Node> {
        self.fetch_query(target, Message::FetchPredecessor)
    }

    /// Asks `target` to run a successor lookup for `key`.
    pub fn query_successor(&self, key: Identifier, target: &Node) -> crate::Result<Node> {
        self.fetch_query(target, Message::QuerySuccessor(key))
    }

    /// Asks `target` to run a predecessor lookup for `key`.
    pub fn query_predecessor(&self, key: Identifier, target: &Node) -> crate::Result<Node> {
        self.fetch_query(target, Message::QueryPredecessor(key))
    }

    /// Asks `target` for its closest finger preceding `key`.
    pub fn query_closest_finger(&self, key: Identifier, target: &Node) -> crate::Result<Node> {
        self.fetch_query(target, Message::QueryClosestFinger(key))
    }

    /// Tells `target` to install `successor` as its new successor.
    pub fn request_update_successor(&self, successor: &Node, target: &Node) -> crate::Result<()> {
        self.send_request(target, Message::UpdateSuccessor(successor.clone()))
    }

    /// Tells `target` to install `predecessor` as its new predecessor.
    pub fn request_update_predecessor(
        &self,
        predecessor: &Node,
        target: &Node,
    ) -> crate::Result<()> {
        self.send_request(target, Message::UpdatePredecessor(predecessor.clone()))
    }

    /// Offers `candidate` to `target` for finger entry `index`; the target
    /// forwards the offer along the ring as long as it improves fingers.
    pub fn request_update_finger_table(
        &self,
        candidate: &Node,
        index: usize,
        target: &Node,
    ) -> crate::Result<()> {
        self.send_request(target, Message::UpdateFingerTable(candidate.clone(), index))
    }

    /// Tells `target` to replace finger entry `index` if it still points at
    /// the departed node `old`.
    pub fn request_remove_node(
        &self,
        old: &Node,
        index: usize,
        replace: &Node,
        target: &Node,
    ) -> crate::Result<()> {
        self.send_request(
            target,
            Message::RemoveNode {
                old: old.clone(),
                index,
                replace: replace.clone(),
            },
        )
    }

    /// Looks up `key` in the local data store of `target`.
    pub fn search_query(&self, key: &str, target: &Node) -> crate::Result<String> {
        let mut con = Connection::open(target.endpoint(), self.timeout)?;
        con.send(&Message::SearchQuery(key.to_string()))?;
        con.shutdown_write()?;

        Ok(con.read_line()?)
    }

    /// Asks `target` to dump its finger table to its local log.
    pub fn request_print_table(&self, target: &Node) -> crate::Result<()> {
        self.send_request(target, Message::PrintTable)
    }

    /// Probes whether `target` is alive.
    ///
    /// A successful connect is the acknowledgement. Any I/O failure,
    /// including a timeout, counts as the node being down.
    pub fn ping(&self, target: &Node) -> bool {
        log::debug!("Pinging {}", target);

        match Connection::open(target.endpoint(), self.timeout) {
            Ok(mut con) => con.send(&Message::Ping).is_ok(),
            Err(_) => false,
        }
    }

    /// Sends a request and reads a node triple back.
    fn fetch_query(&self, target: &Node, msg: Message) -> crate::Result<Node> {
        log::debug!("Sending {:?} to {}", msg, target);

        let mut con = Connection::open(target.endpoint(), self.timeout)?;
        con.send(&msg)?;
        con.shutdown_write()?;

        Ok(con.read_node()?)
    }

    /// Sends a request that has no response.
    fn send_request(&self, target: &Node, msg: Message) -> crate::Result<()> {
        log::debug!("Sending {:?} to {}", msg, target);

        let mut con = Connection::open(target.endpoint(), self.timeout)?;
        con.send(&msg)?;

        Ok(())
    }
}

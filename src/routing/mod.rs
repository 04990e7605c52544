//! Node identity and the per-process routing table.
//!
//! A [`Node`] is the address-only reference under which peers know each
//! other: an identifier on the ring together with the `host:port` pair it
//! was derived from. Nodes never hold memory handles to one another; every
//! pointer in the protocol is such a triple.
//!
//! The [`RoutingTable`] bundles all mutable routing state of one process:
//! the predecessor, the successor, a warm replacement for the successor and
//! the finger table used to accelerate lookups. The successor *is* the
//! first finger table entry; the table stores it only once, so the
//! invariant `finger[0] == successor` holds by construction no matter which
//! writer runs.
//!
//! [`Node`]: struct.Node.html
//! [`RoutingTable`]: struct.RoutingTable.html

use self::identifier::{hash_address, Identifier, KEY_BITS};
use std::fmt;

pub mod identifier;

/// An address-only reference to a peer
#[derive(Clone, Debug)]
pub struct Node {
    pub id: Identifier,
    pub host: String,
    pub port: u16,
}

impl Node {
    /// Creates a node for the given address, deriving its ring position.
    pub fn new(host: &str, port: u16) -> Self {
        Node {
            id: hash_address(host, port),
            host: host.to_string(),
            port,
        }
    }

    /// Creates a node from an identifier received on the wire.
    ///
    /// The identifier is trusted as sent; receivers do not rehash.
    pub fn with_id(id: Identifier, host: String, port: u16) -> Self {
        Node { id, host, port }
    }

    /// The address pair used to open a connection to this node.
    pub fn endpoint(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

/// Two nodes are the same peer iff their addresses match; the identifier
/// is derived and therefore redundant.
impl PartialEq for Node {
    fn eq(&self, other: &Node) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Eq for Node {}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{} at position {}", self.host, self.port, self.id)
    }
}

/// Routing state of the local node
#[derive(Clone, Debug)]
pub struct RoutingTable {
    current: Node,
    predecessor: Node,
    second_successor: Node,
    // fingers[0] doubles as the successor pointer
    fingers: Vec<Node>,
}

impl RoutingTable {
    /// Creates the routing table of the only node in a fresh ring: every
    /// pointer, including all fingers, refers back to the node itself.
    pub fn singleton(current: Node) -> Self {
        let fingers = vec![current.clone(); KEY_BITS];

        RoutingTable {
            predecessor: current.clone(),
            second_successor: current.clone(),
            current,
            fingers,
        }
    }

    /// Creates a routing table for a node that is about to join a ring.
    ///
    /// The successor, its successor and the predecessor have already been
    /// obtained from the bootstrap peer; the remaining fingers start out
    /// pointing at the node itself until the join flow fills them in.
    pub fn new(current: Node, predecessor: Node, successor: Node, second_successor: Node) -> Self {
        let mut fingers = vec![current.clone(); KEY_BITS];
        fingers[0] = successor;

        RoutingTable {
            current,
            predecessor,
            second_successor,
            fingers,
        }
    }

    pub fn current(&self) -> &Node {
        &self.current
    }

    pub fn predecessor(&self) -> &Node {
        &self.predecessor
    }

    pub fn successor(&self) -> &Node {
        &self.fingers[0]
    }

    pub fn second_successor(&self) -> &Node {
        &self.second_successor
    }

    pub fn finger(&self, index: usize) -> &Node {
        &self.fingers[index]
    }

    pub fn set_predecessor(&mut self, predecessor: Node) {
        self.predecessor = predecessor;
    }

    /// Installs a new successor, which also rewrites `finger[0]`.
    ///
    /// The caller is responsible for refreshing the second successor
    /// afterwards; see [`Chord::adopt_successor`].
    ///
    /// [`Chord::adopt_successor`]: ../chord/struct.Chord.html#method.adopt_successor
    pub fn set_successor(&mut self, successor: Node) {
        self.fingers[0] = successor;
    }

    pub fn set_second_successor(&mut self, second_successor: Node) {
        self.second_successor = second_successor;
    }

    /// Points the finger at the given peer. Writing entry zero is the same
    /// as installing a new successor.
    pub fn set_finger(&mut self, index: usize, peer: Node) {
        self.fingers[index] = peer;
    }

    /// Collapses the table back to the singleton state, used when the only
    /// other node of a two-node ring has left.
    pub fn reset(&mut self) {
        self.predecessor = self.current.clone();
        self.second_successor = self.current.clone();
        for finger in self.fingers.iter_mut() {
            *finger = self.current.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u32, port: u16) -> Node {
        Node::with_id(Identifier::new(id), "127.0.0.1".to_string(), port)
    }

    #[test]
    fn singleton_points_everywhere_at_itself() {
        let table = RoutingTable::singleton(node(42, 9000));

        assert_eq!(table.predecessor(), table.current());
        assert_eq!(table.successor(), table.current());
        assert_eq!(table.second_successor(), table.current());
        for i in 0..KEY_BITS {
            assert_eq!(table.finger(i), table.current());
        }
    }

    #[test]
    fn successor_and_first_finger_are_one() {
        let mut table = RoutingTable::singleton(node(42, 9000));
        let other = node(180, 9001);

        table.set_successor(other.clone());
        assert_eq!(table.finger(0), &other);

        let third = node(7, 9002);
        table.set_finger(0, third.clone());
        assert_eq!(table.successor(), &third);
    }

    #[test]
    fn equality_ignores_the_identifier() {
        let a = node(1, 9000);
        let b = node(999, 9000);

        assert_eq!(a, b);
        assert_ne!(a, node(1, 9001));
    }

    #[test]
    fn reset_collapses_to_singleton() {
        let mut table = RoutingTable::new(node(42, 9000), node(1, 9001), node(99, 9002), node(1, 9001));

        table.set_finger(7, node(99, 9002));
        table.reset();

        assert_eq!(table.predecessor(), table.current());
        assert_eq!(table.successor(), table.current());
        assert_eq!(table.second_successor(), table.current());
        for i in 0..KEY_BITS {
            assert_eq!(table.finger(i), table.current());
        }
    }
}

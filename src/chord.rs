//! The lookup engine and the recursive membership operations.
//!
//! All operations are defined over an arbitrary node which may or may not
//! be the local one. [`Chord`] therefore borrows the routing table (whose
//! lock the caller already holds) together with the outbound
//! [`Procedures`]: whenever a primitive targets the local node it computes
//! the answer from the table directly, and only otherwise opens a
//! connection. This mirrors the request topology of the protocol, in which
//! no node ever sends a request to itself, so handling a request while
//! holding the table lock cannot re-enter the local handler.
//!
//! [`Chord`]: struct.Chord.html
//! [`Procedures`]: ../procedures/struct.Procedures.html

use crate::procedures::Procedures;
use crate::routing::identifier::{Identifier, KEY_BITS};
use crate::routing::{Node, RoutingTable};

pub struct Chord<'a> {
    table: &'a mut RoutingTable,
    procedures: &'a Procedures,
}

impl<'a> Chord<'a> {
    pub fn new(table: &'a mut RoutingTable, procedures: &'a Procedures) -> Self {
        Self { table, procedures }
    }

    /// Returns the successor pointer of `target`, locally or remotely.
    pub fn fetch_successor(&self, target: &Node) -> crate::Result<Node> {
        if target == self.table.current() {
            Ok(self.table.successor().clone())
        } else {
            self.procedures.fetch_successor(target)
        }
    }

    /// Returns the closest preceding finger of `target` for `key`.
    pub fn query_closest_finger(&self, key: Identifier, target: &Node) -> crate::Result<Node> {
        if target == self.table.current() {
            Ok(self.closest_preceding_finger(key))
        } else {
            self.procedures.query_closest_finger(key, target)
        }
    }

    /// Scans the finger table from the widest entry down and returns the
    /// first finger on the open arc between the own position and `key`,
    /// or the local node if no finger precedes the key.
    pub fn closest_preceding_finger(&self, key: Identifier) -> Node {
        let current_id = self.table.current().id;

        for index in (0..KEY_BITS).rev() {
            let finger = self.table.finger(index);
            // open arc (current, key), inclusive predicate shifted by one
            // on both ends
            if finger.id.is_between(current_id + 1, key - 1) {
                return finger.clone();
            }
        }

        self.table.current().clone()
    }

    /// Finds the node immediately preceding `key` on the ring.
    ///
    /// Starting at the local node, each iteration moves to the closest
    /// preceding finger of the current candidate until `key` falls into
    /// the half-open arc between the candidate and its successor. Each hop
    /// strictly shrinks the remaining arc, so a quiesced ring is traversed
    /// in at most [`KEY_BITS`] hops.
    ///
    /// [`KEY_BITS`]: ../routing/identifier/constant.KEY_BITS.html
    pub fn find_predecessor(&self, key: Identifier) -> crate::Result<Node> {
        let current = self.table.current().clone();

        if current.id == self.table.successor().id {
            // single node ring
            return Ok(current);
        }

        let mut candidate = current;
        let mut successor = self.table.successor().clone();

        // half-open arc (candidate, successor]
        while !key.is_between(candidate.id + 1, successor.id) && key != successor.id {
            candidate = self.query_closest_finger(key, &candidate)?;
            successor = self.fetch_successor(&candidate)?;
        }

        Ok(candidate)
    }

    /// Finds the node responsible for `key`: the successor of the node
    /// returned by [`find_predecessor`].
    ///
    /// [`find_predecessor`]: #method.find_predecessor
    pub fn find_successor(&self, key: Identifier) -> crate::Result<Node> {
        let predecessor = self.find_predecessor(key)?;
        self.fetch_successor(&predecessor)
    }

    /// Installs `successor` and refreshes the second successor by asking
    /// the new successor for its own successor pointer.
    pub fn adopt_successor(&mut self, successor: Node) -> crate::Result<()> {
        self.table.set_successor(successor);

        let successor = self.table.successor().clone();
        let second = self.fetch_successor(&successor)?;
        self.table.set_second_successor(second);

        Ok(())
    }

    /// Handles an `update_fin` announcement: `candidate` has joined and
    /// offers itself for finger entry `index`.
    ///
    /// If the candidate lies on the half-open arc between the own position
    /// and the current finger it is the tighter pointer and replaces the
    /// entry; the announcement is then forwarded to the predecessor, whose
    /// finger may be improvable too. The chain ends at the first node that
    /// already has a closer finger, or when it would loop back to the
    /// candidate itself.
    pub fn update_finger_table(&mut self, candidate: &Node, index: usize) -> crate::Result<()> {
        let current_id = self.table.current().id;

        if candidate.id == current_id {
            return Ok(());
        }

        // half-open arc (current, finger[index]]
        if candidate
            .id
            .is_between(current_id + 1, self.table.finger(index).id)
        {
            log::info!("Finger {} now points at {}", index, candidate);

            if index == 0 {
                self.adopt_successor(candidate.clone())?;
            } else {
                self.table.set_finger(index, candidate.clone());
            }

            let predecessor = self.table.predecessor().clone();
            if candidate.id != predecessor.id {
                self.request_update_finger_table(candidate, index, &predecessor)?;
            }
        }

        Ok(())
    }

    /// Sends an `update_fin` announcement to `target`, or applies it
    /// directly to the own finger table when the target is the local node.
    pub fn request_update_finger_table(
        &mut self,
        candidate: &Node,
        index: usize,
        target: &Node,
    ) -> crate::Result<()> {
        if target == self.table.current() {
            self.table.set_finger(index, candidate.clone());
            Ok(())
        } else {
            self.procedures
                .request_update_finger_table(candidate, index, target)
        }
    }

    /// Handles a `remove_node` repair: the departed node `old` must vanish
    /// from finger entry `index`, with `replace` taking its place.
    ///
    /// The repair is forwarded to the predecessor as long as the entry
    /// still matched; the first node whose finger already differs ends the
    /// chain.
    pub fn remove_node(&mut self, old: &Node, index: usize, replace: &Node) -> crate::Result<()> {
        if self.table.finger(index) != old {
            return Ok(());
        }

        log::info!(
            "Replacing departed {} in finger {} with {}",
            old,
            index,
            replace
        );

        if index == 0 {
            self.adopt_successor(replace.clone())?;
        } else {
            self.table.set_finger(index, replace.clone());
        }

        let predecessor = self.table.predecessor().clone();
        self.request_remove_node(old, index, replace, &predecessor)
    }

    /// Sends a `remove_node` repair to `target`, or runs it directly when
    /// the target is the local node.
    pub fn request_remove_node(
        &mut self,
        old: &Node,
        index: usize,
        replace: &Node,
        target: &Node,
    ) -> crate::Result<()> {
        if target == self.table.current() {
            self.remove_node(old, index, replace)
        } else {
            self.procedures
                .request_remove_node(old, index, replace, target)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::RoutingTable;

    fn node(id: u32, port: u16) -> Node {
        Node::with_id(Identifier::new(id), "127.0.0.1".to_string(), port)
    }

    fn procedures() -> Procedures {
        Procedures::new(100)
    }

    #[test]
    fn singleton_answers_every_lookup_with_itself() {
        let mut table = RoutingTable::singleton(node(42, 9000));
        let procedures = procedures();
        let chord = Chord::new(&mut table, &procedures);

        for &key in &[0u32, 41, 42, 43, 3_000_000_000] {
            let key = Identifier::new(key);
            assert_eq!(chord.find_predecessor(key).unwrap(), node(42, 9000));
            assert_eq!(chord.find_successor(key).unwrap(), node(42, 9000));
        }
    }

    #[test]
    fn closest_finger_prefers_the_widest_preceding_entry() {
        let mut table = RoutingTable::singleton(node(0, 9000));
        table.set_finger(0, node(50, 9001));
        table.set_finger(5, node(50, 9001));
        table.set_finger(6, node(120, 9002));
        table.set_finger(7, node(200, 9003));

        let procedures = procedures();
        let chord = Chord::new(&mut table, &procedures);

        // scanning from the widest finger down, 200 precedes key 230
        assert_eq!(
            chord.closest_preceding_finger(Identifier::new(230)),
            node(200, 9003)
        );
        // 200 does not precede key 150, but 120 does
        assert_eq!(
            chord.closest_preceding_finger(Identifier::new(150)),
            node(120, 9002)
        );
        // only the successor precedes key 60
        assert_eq!(
            chord.closest_preceding_finger(Identifier::new(60)),
            node(50, 9001)
        );
        // no finger lies in (0, 10)
        assert_eq!(
            chord.closest_preceding_finger(Identifier::new(10)),
            node(0, 9000)
        );
    }

    #[test]
    fn finger_update_installs_tighter_pointer_and_stops_at_itself() {
        // predecessor is the node itself, so the forwarded announcement is
        // applied locally and the chain ends
        let mut table = RoutingTable::singleton(node(0, 9000));
        let procedures = procedures();
        let mut chord = Chord::new(&mut table, &procedures);

        let joined = node(100, 9001);
        chord.update_finger_table(&joined, 3).unwrap();

        assert_eq!(table.finger(3), &node(100, 9001));
    }

    #[test]
    fn finger_update_ignores_the_own_announcement() {
        let mut table = RoutingTable::singleton(node(42, 9000));
        let procedures = procedures();
        let mut chord = Chord::new(&mut table, &procedures);

        let same_position = node(42, 9005);
        chord.update_finger_table(&same_position, 2).unwrap();

        assert_eq!(table.finger(2), &node(42, 9000));
    }

    #[test]
    fn remove_node_leaves_unrelated_fingers_alone() {
        let mut table = RoutingTable::singleton(node(0, 9000));
        table.set_finger(4, node(77, 9004));

        let procedures = procedures();
        let mut chord = Chord::new(&mut table, &procedures);

        let departed = node(50, 9001);
        let replacement = node(99, 9002);
        chord.remove_node(&departed, 4, &replacement).unwrap();

        assert_eq!(table.finger(4), &node(77, 9004));
    }

    #[test]
    fn remove_node_replaces_matching_finger() {
        let mut table = RoutingTable::singleton(node(0, 9000));
        let departed = node(50, 9001);
        table.set_finger(4, departed.clone());

        let procedures = procedures();
        let mut chord = Chord::new(&mut table, &procedures);

        let replacement = node(99, 9002);
        chord.remove_node(&departed, 4, &replacement).unwrap();

        assert_eq!(table.finger(4), &replacement);
    }
}

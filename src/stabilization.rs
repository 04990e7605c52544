//! Joining an existing ring and repairing it when the successor fails.
//!
//! [`Bootstrap`] drives the join flow: it obtains the initial routing
//! pointers from a bootstrap peer, fills in the finger table and then walks
//! the ring to announce the new node to every peer whose fingers should now
//! point at it.
//!
//! [`KeepAlive`] is the only failure detector in the system. It probes the
//! successor in regular intervals and, when the probe fails, installs the
//! second successor as the new one and walks the ring to clear every finger
//! still pointing at the departed node. Lookups that race with a failure
//! simply error out; repair happens here and nowhere else.
//!
//! Both tasks run lookups on a clone of the routing table and apply their
//! writes under short lock scopes, so a notification that loops back as an
//! inbound request cannot wedge the server against the long-running flow.
//!
//! [`Bootstrap`]: struct.Bootstrap.html
//! [`KeepAlive`]: struct.KeepAlive.html

use crate::chord::Chord;
use crate::procedures::Procedures;
use crate::routing::identifier::KEY_BITS;
use crate::routing::{Node, RoutingTable};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// The join flow of a node entering an existing ring
pub struct Bootstrap {
    current: Node,
    bootstrap: Node,
    procedures: Procedures,
}

impl Bootstrap {
    /// Prepares a join via the given bootstrap peer.
    pub fn new(current: Node, bootstrap: Node, timeout: u64) -> Self {
        Self {
            current,
            bootstrap,
            procedures: Procedures::new(timeout),
        }
    }

    /// Obtains the initial routing pointers from the ring.
    ///
    /// The bootstrap peer looks up our successor; the successor provides
    /// its own successor as our warm replacement and hands over its
    /// previous predecessor, which becomes ours. That node is then told
    /// that its next neighbour changed. The returned table is ready for
    /// serving but still has unfilled fingers.
    pub fn initial_table(&self) -> crate::Result<RoutingTable> {
        let successor = self
            .procedures
            .query_successor(self.current.id, &self.bootstrap)?;
        let second_successor = self.procedures.fetch_successor(&successor)?;
        let predecessor = self.procedures.fetch_predecessor(&successor)?;

        log::info!("Joining between {} and {}", predecessor, successor);

        self.procedures
            .request_update_predecessor(&self.current, &predecessor)?;

        Ok(RoutingTable::new(
            self.current.clone(),
            predecessor,
            successor,
            second_successor,
        ))
    }

    /// Fills in finger entries one up to the key width.
    ///
    /// Successive finger starts often land before the previous finger, in
    /// which case that entry is reused without asking the ring. Otherwise
    /// the bootstrap peer resolves the start key; a result that lies
    /// behind the own position means the arc wraps past us and contains no
    /// other node, so the entry points back at the local node.
    pub fn build_fingers(&self, routing: &Arc<Mutex<RoutingTable>>) -> crate::Result<()> {
        for index in 1..KEY_BITS {
            let start = self.current.id + (1u32 << index);
            let previous = routing.lock().unwrap().finger(index - 1).clone();

            // inclusive arc [current, previous - 1]: the previous finger
            // still covers this start key
            let finger = if start.is_between(self.current.id, previous.id - 1) {
                previous
            } else {
                let found = self.procedures.query_successor(start, &self.bootstrap)?;

                if found.id.is_between(start, self.current.id) {
                    found
                } else {
                    self.current.clone()
                }
            };

            log::debug!("Finger {} initialized to {}", index, finger);
            routing.lock().unwrap().set_finger(index, finger);
        }

        Ok(())
    }

    /// Walks the ring backwards and announces the new node to every peer
    /// whose finger table may now have a tighter pointer.
    pub fn update_peers(&self, routing: &Arc<Mutex<RoutingTable>>) -> crate::Result<()> {
        for index in 0..KEY_BITS {
            let target_key = self.current.id - (1u32 << index);

            // run the lookup on a snapshot so inbound requests triggered
            // by our own announcements are not blocked out
            let predecessor = {
                let mut snapshot = routing.lock().unwrap().clone();
                Chord::new(&mut snapshot, &self.procedures).find_predecessor(target_key)?
            };

            let mut table = routing.lock().unwrap();
            Chord::new(&mut table, &self.procedures).request_update_finger_table(
                &self.current,
                index,
                &predecessor,
            )?;
        }

        Ok(())
    }
}

/// Periodic successor probing and ring repair
pub struct KeepAlive {
    routing: Arc<Mutex<RoutingTable>>,
    procedures: Procedures,
    period: Duration,
}

impl KeepAlive {
    pub fn new(routing: Arc<Mutex<RoutingTable>>, timeout: u64, period_secs: u64) -> Self {
        Self {
            routing,
            procedures: Procedures::new(timeout),
            period: Duration::from_secs(period_secs),
        }
    }

    /// Moves the keep-alive loop onto its own thread.
    pub fn spawn(self) -> thread::JoinHandle<()> {
        thread::spawn(move || self.run())
    }

    fn run(&self) {
        loop {
            self.check_successor();
            thread::sleep(self.period);
        }
    }

    /// Probes the successor once and repairs the ring if it is gone.
    fn check_successor(&self) {
        let (current, successor, predecessor, second_successor) = {
            let table = self.routing.lock().unwrap();
            (
                table.current().clone(),
                table.successor().clone(),
                table.predecessor().clone(),
                table.second_successor().clone(),
            )
        };

        if successor == current || self.procedures.ping(&successor) {
            return;
        }

        log::warn!("Successor {} has left, repairing the ring", successor);

        if successor == predecessor {
            // the only other node of a two-node ring is gone
            self.routing.lock().unwrap().reset();
            log::info!("Collapsed to a single node ring");
            return;
        }

        let dead = successor;
        self.promote_second_successor(&second_successor);

        if let Err(err) = self
            .procedures
            .request_update_predecessor(&current, &second_successor)
        {
            log::warn!(
                "Could not announce ourselves to new successor {}: {}",
                second_successor,
                err
            );
        }

        // clear every finger on the ring still pointing at the dead node,
        // entry by entry, starting from the node preceding its coverage
        for index in 0..KEY_BITS {
            let target_key = dead.id - (1u32 << index) + 1;

            let predecessor = {
                let mut snapshot = self.routing.lock().unwrap().clone();
                match Chord::new(&mut snapshot, &self.procedures).find_predecessor(target_key) {
                    Ok(node) => node,
                    Err(err) => {
                        log::warn!("Lookup for repair of finger {} failed: {}", index, err);
                        continue;
                    }
                }
            };

            let mut table = self.routing.lock().unwrap();
            let repair = Chord::new(&mut table, &self.procedures).request_remove_node(
                &dead,
                index,
                &second_successor,
                &predecessor,
            );

            if let Err(err) = repair {
                log::warn!("Repair of finger {} via {} failed: {}", index, predecessor, err);
            }
        }

        log::info!("Finished updating all nodes after {} left", dead);
    }

    /// Installs the warm replacement as successor, then refreshes the
    /// replacement slot by asking the new successor for its successor.
    fn promote_second_successor(&self, second_successor: &Node) {
        self.routing
            .lock()
            .unwrap()
            .set_successor(second_successor.clone());

        match self.procedures.fetch_successor(second_successor) {
            Ok(new_second) => {
                self.routing.lock().unwrap().set_second_successor(new_second);
            }
            Err(err) => log::warn!(
                "Could not refresh second successor from {}: {}",
                second_successor,
                err
            ),
        }
    }
}

//! Multi-node scenarios driven over the wire protocol on loopback TCP.
//!
//! Every test starts its nodes on its own port range so the scenarios can
//! run in parallel. Nodes are observed purely through the protocol itself,
//! the same way a peer would see them.

use chord::config::Config;
use chord::procedures::Procedures;
use chord::routing::identifier::Identifier;
use chord::routing::Node;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

const HOST: &str = "127.0.0.1";

/// Outbound timeout for test queries in milliseconds.
const TIMEOUT: u64 = 2000;

/// Probe interval of the nodes under test; failure scenarios wait a little
/// over two periods for the repair to run.
const PROBE_SECS: u64 = 2;

fn test_config() -> Config {
    Config {
        timeout_ms: TIMEOUT,
        workers: 4,
        keep_alive_secs: PROBE_SECS,
    }
}

/// Starts a node on its own thread and waits until it accepts connections.
fn start_node(port: u16, bootstrap: Option<u16>) -> Node {
    let bootstrap = bootstrap.map(|boot_port| (HOST.to_string(), boot_port));

    thread::spawn(move || {
        chord::run(test_config(), HOST, port, bootstrap).unwrap();
    });

    thread::sleep(Duration::from_millis(500));
    Node::new(HOST, port)
}

fn quiesce() {
    thread::sleep(Duration::from_millis(1500));
}

/// Serves exactly one `fetch_suc` request with the given reply, then goes
/// dark: afterwards connections to the port are refused, which makes the
/// address look like a crashed node.
fn doomed_node(port: u16, reply: Node) -> Node {
    let listener = TcpListener::bind((HOST, port)).unwrap();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut line = String::new();
        reader.read_line(&mut line).unwrap();

        if line.starts_with("fetch_suc") {
            write!(stream, "{}\n{}\n{}\n", reply.id, reply.host, reply.port).unwrap();
        }
    });

    Node::new(HOST, port)
}

/// Asserts that all live nodes resolve the given key to the same owner and
/// returns that owner.
fn assert_lookup_agreement(procedures: &Procedures, nodes: &[&Node], key: Identifier) -> Node {
    let owner = procedures.query_successor(key, nodes[0]).unwrap();

    for node in &nodes[1..] {
        assert_eq!(
            procedures.query_successor(key, node).unwrap(),
            owner,
            "nodes disagree on the owner of key {}",
            key
        );
    }

    owner
}

#[test]
fn singleton_ring_answers_for_everything() {
    let a = start_node(39100, None);
    let procedures = Procedures::new(TIMEOUT);

    assert_eq!(procedures.fetch_successor(&a).unwrap(), a);
    assert_eq!(procedures.fetch_predecessor(&a).unwrap(), a);

    for &key in &[0u32, 42, 3_000_000_000] {
        let key = Identifier::new(key);
        assert_eq!(procedures.query_successor(key, &a).unwrap(), a);
        assert_eq!(procedures.query_predecessor(key, &a).unwrap(), a);
        assert_eq!(procedures.query_closest_finger(key, &a).unwrap(), a);
    }

    procedures.request_print_table(&a).unwrap();
}

#[test]
fn fresh_ring_serves_its_sample_data() {
    let a = start_node(39105, None);
    let procedures = Procedures::new(TIMEOUT);

    assert_eq!(
        procedures.search_query("Gettysburg Address", &a).unwrap(),
        "Search key found."
    );
    assert_eq!(
        procedures.search_query("Moby-Dick", &a).unwrap(),
        "Not found."
    );
}

#[test]
fn second_node_joins_and_both_point_at_each_other() {
    let a = start_node(39110, None);
    let b = start_node(39111, Some(39110));
    quiesce();

    let procedures = Procedures::new(TIMEOUT);

    assert_eq!(procedures.fetch_successor(&a).unwrap(), b);
    assert_eq!(procedures.fetch_predecessor(&a).unwrap(), b);
    assert_eq!(procedures.fetch_successor(&b).unwrap(), a);
    assert_eq!(procedures.fetch_predecessor(&b).unwrap(), a);
}

#[test]
fn lookups_agree_across_a_three_node_ring() {
    let a = start_node(39120, None);
    let b = start_node(39121, Some(39120));
    quiesce();
    let c = start_node(39122, Some(39120));
    quiesce();

    let procedures = Procedures::new(TIMEOUT);
    let nodes = [&a, &b, &c];

    // every node resolves its own position to itself
    for node in &nodes {
        let owner = assert_lookup_agreement(&procedures, &nodes, node.id);
        assert_eq!(owner, **node);
    }

    // arbitrary keys have one owner, whoever it is
    for &key in &[0u32, 1, 42, 65_536, 3_000_000_000, u32::max_value()] {
        assert_lookup_agreement(&procedures, &nodes, Identifier::new(key));
    }
}

#[test]
fn failed_successor_is_replaced_by_the_second_successor() {
    let a = start_node(39130, None);
    let c = start_node(39131, Some(39130));
    quiesce();

    let procedures = Procedures::new(TIMEOUT);

    // wedge a doomed node in as a's successor; a fetches the doomed node's
    // successor (c) into its replacement slot, then the node goes dark
    let b = doomed_node(39132, c.clone());
    procedures.request_update_successor(&b, &a).unwrap();
    thread::sleep(Duration::from_millis(500));

    // the next probe notices the loss and repairs the ring
    thread::sleep(Duration::from_secs(2 * PROBE_SECS));

    assert_eq!(procedures.fetch_successor(&a).unwrap(), c);
    assert_eq!(procedures.fetch_predecessor(&c).unwrap(), a);
    assert_eq!(procedures.fetch_successor(&c).unwrap(), a);

    let nodes = [&a, &c];
    for key in [0u32, 42, 3_000_000_000]
        .iter()
        .map(|&key| Identifier::new(key))
        .chain(vec![a.id, c.id])
    {
        assert_lookup_agreement(&procedures, &nodes, key);
    }
}

#[test]
fn losing_the_only_peer_collapses_to_a_singleton() {
    let a = start_node(39140, None);
    let procedures = Procedures::new(TIMEOUT);

    // point both neighbour slots at an address nobody listens on
    let dead = Node::new(HOST, 39141);
    procedures.request_update_successor(&dead, &a).unwrap();
    procedures.request_update_predecessor(&dead, &a).unwrap();

    thread::sleep(Duration::from_secs(2 * PROBE_SECS));

    assert_eq!(procedures.fetch_successor(&a).unwrap(), a);
    assert_eq!(procedures.fetch_predecessor(&a).unwrap(), a);
    assert_eq!(
        procedures
            .query_successor(Identifier::new(12345), &a)
            .unwrap(),
        a
    );
}

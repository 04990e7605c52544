//! The text-line wire protocol spoken between peers.
//!
//! A request is a command word on its own newline-terminated line,
//! optionally followed by arguments on further lines. A node triple is
//! serialized as three lines in order: the ring position in decimal, the
//! host in ASCII and the port in decimal. Responses, where a command has
//! one, carry a bare node triple in the same format.
//!
//! The [`Message`] enum lists every supported command together with its
//! payload and provides parsing from and writing to a stream. Lines are
//! capped at [`MAX_LINE`] bytes; integer fields that fail to parse fall
//! back to zero, matching what every deployed node does.
//!
//! [`Message`]: enum.Message.html
//! [`MAX_LINE`]: constant.MAX_LINE.html

use crate::error::ProtocolError;
use crate::routing::identifier::Identifier;
use crate::routing::Node;
use std::io::{self, BufRead, Read, Write};

/// Maximum length in bytes of a single protocol line.
pub const MAX_LINE: usize = 8192;

const FETCH_SUCCESSOR: &str = "fetch_suc";
const FETCH_PREDECESSOR: &str = "fetch_pre";
const QUERY_SUCCESSOR: &str = "query_suc";
const QUERY_PREDECESSOR: &str = "query_pre";
const QUERY_CLOSEST_FINGER: &str = "query_cpf";
const UPDATE_SUCCESSOR: &str = "update_suc";
const UPDATE_PREDECESSOR: &str = "update_pre";
const UPDATE_FINGER_TABLE: &str = "update_fin";
const REMOVE_NODE: &str = "remove_node";
const SEARCH_QUERY: &str = "search_query";
const PRINT_TABLE: &str = "print_table";
const PING: &str = "ping";

/// A peer-to-peer request
///
/// The `Fetch*` and `Query*` commands are answered with a node triple, the
/// `Update*` and `RemoveNode` commands mutate routing state without a
/// response, `SearchQuery` is answered with a result line and `PrintTable`
/// and `Ping` have no response at all.
#[derive(Debug)]
pub enum Message {
    /// Ask a node for its successor pointer.
    FetchSuccessor,
    /// Ask a node for its predecessor pointer.
    FetchPredecessor,
    /// Ask a node to run a full successor lookup for the given key.
    QuerySuccessor(Identifier),
    /// Ask a node to run a full predecessor lookup for the given key.
    QueryPredecessor(Identifier),
    /// Ask a node for its closest finger preceding the given key.
    QueryClosestFinger(Identifier),
    /// Install a new successor on the receiving node.
    UpdateSuccessor(Node),
    /// Install a new predecessor on the receiving node.
    UpdatePredecessor(Node),
    /// A node announces itself as a candidate for the given finger entry;
    /// forwarded backwards along the ring until a closer finger is found.
    UpdateFingerTable(Node, usize),
    /// Replace a finger entry pointing at a departed node; forwarded
    /// backwards along the ring until the entry no longer matches.
    RemoveNode {
        old: Node,
        index: usize,
        replace: Node,
    },
    /// Look up a key in the receiving node's local data store.
    SearchQuery(String),
    /// Dump the receiving node's finger table to its local log.
    PrintTable,
    /// Liveness probe; a successful connect is the acknowledgement.
    Ping,
}

impl Message {
    /// Reads one request from the stream.
    ///
    /// Commands that carry a node or an index consume the corresponding
    /// extra lines. An unknown command word is surfaced as an
    /// [`UnknownCommand`] error wrapped in `io::Error`.
    ///
    /// [`UnknownCommand`]: ../error/enum.ProtocolError.html
    pub fn parse<R: BufRead>(reader: &mut R) -> io::Result<Self> {
        let line = read_line(reader)?;
        let mut parts = line.splitn(2, ' ');
        let command = parts.next().unwrap_or("");
        let argument = parts.next().unwrap_or("");

        let msg = match command {
            FETCH_SUCCESSOR => Message::FetchSuccessor,
            FETCH_PREDECESSOR => Message::FetchPredecessor,
            QUERY_SUCCESSOR => Message::QuerySuccessor(parse_key(argument)),
            QUERY_PREDECESSOR => Message::QueryPredecessor(parse_key(argument)),
            QUERY_CLOSEST_FINGER => Message::QueryClosestFinger(parse_key(argument)),
            UPDATE_SUCCESSOR => Message::UpdateSuccessor(read_node(reader)?),
            UPDATE_PREDECESSOR => Message::UpdatePredecessor(read_node(reader)?),
            UPDATE_FINGER_TABLE => {
                let node = read_node(reader)?;
                let index = parse_index(&read_line(reader)?);
                Message::UpdateFingerTable(node, index)
            }
            REMOVE_NODE => {
                let old = read_node(reader)?;
                let index = parse_index(&read_line(reader)?);
                let replace = read_node(reader)?;
                Message::RemoveNode {
                    old,
                    index,
                    replace,
                }
            }
            SEARCH_QUERY => Message::SearchQuery(argument.to_string()),
            PRINT_TABLE => Message::PrintTable,
            PING => Message::Ping,
            _ => {
                let error = ProtocolError::UnknownCommand(command.to_string());
                return Err(io::Error::new(io::ErrorKind::InvalidData, error));
            }
        };

        Ok(msg)
    }

    /// Writes this request to the stream in wire format.
    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Message::FetchSuccessor => writeln!(writer, "{}", FETCH_SUCCESSOR),
            Message::FetchPredecessor => writeln!(writer, "{}", FETCH_PREDECESSOR),
            Message::QuerySuccessor(key) => writeln!(writer, "{} {}", QUERY_SUCCESSOR, key),
            Message::QueryPredecessor(key) => writeln!(writer, "{} {}", QUERY_PREDECESSOR, key),
            Message::QueryClosestFinger(key) => {
                writeln!(writer, "{} {}", QUERY_CLOSEST_FINGER, key)
            }
            Message::UpdateSuccessor(node) => {
                writeln!(writer, "{}", UPDATE_SUCCESSOR)?;
                write_node(writer, node)
            }
            Message::UpdatePredecessor(node) => {
                writeln!(writer, "{}", UPDATE_PREDECESSOR)?;
                write_node(writer, node)
            }
            Message::UpdateFingerTable(node, index) => {
                writeln!(writer, "{}", UPDATE_FINGER_TABLE)?;
                write_node(writer, node)?;
                writeln!(writer, "{}", index)
            }
            Message::RemoveNode {
                old,
                index,
                replace,
            } => {
                writeln!(writer, "{}", REMOVE_NODE)?;
                write_node(writer, old)?;
                writeln!(writer, "{}", index)?;
                write_node(writer, replace)
            }
            Message::SearchQuery(key) => writeln!(writer, "{} {}", SEARCH_QUERY, key),
            Message::PrintTable => writeln!(writer, "{}", PRINT_TABLE),
            Message::Ping => writeln!(writer, "{}", PING),
        }
    }
}

/// Reads a node triple from the stream.
///
/// A connection closed before all three lines arrived surfaces as
/// `UnexpectedEof`, which callers treat like an unreachable peer.
pub fn read_node<R: BufRead>(reader: &mut R) -> io::Result<Node> {
    let key = parse_key(&read_line(reader)?);
    let host = read_line(reader)?;
    let port = read_line(reader)?.trim().parse().unwrap_or(0);

    Ok(Node::with_id(key, host, port))
}

/// Writes a node triple to the stream.
pub fn write_node<W: Write>(writer: &mut W, node: &Node) -> io::Result<()> {
    writeln!(writer, "{}", node.id)?;
    writeln!(writer, "{}", node.host)?;
    writeln!(writer, "{}", node.port)
}

/// Reads one newline-terminated line with the trailing line break removed.
pub fn read_line<R: BufRead>(reader: &mut R) -> io::Result<String> {
    let mut line = String::new();
    let count = Read::take(reader, MAX_LINE as u64).read_line(&mut line)?;

    if count == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "peer closed the connection mid-message",
        ));
    }

    if count == MAX_LINE && !line.ends_with('\n') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            ProtocolError::LineTooLong,
        ));
    }

    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }

    Ok(line)
}

fn parse_key(text: &str) -> Identifier {
    Identifier::new(text.trim().parse().unwrap_or(0))
}

fn parse_index(text: &str) -> usize {
    text.trim().parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn node(id: u32, port: u16) -> Node {
        Node::with_id(Identifier::new(id), "10.0.0.7".to_string(), port)
    }

    #[test]
    fn node_triple_round_trips() {
        let mut wire = Vec::new();
        write_node(&mut wire, &node(3405691582, 9000)).unwrap();

        let parsed = read_node(&mut Cursor::new(wire)).unwrap();

        assert_eq!(parsed.id, Identifier::new(3405691582));
        assert_eq!(parsed.host, "10.0.0.7");
        assert_eq!(parsed.port, 9000);
    }

    #[test]
    fn finger_update_carries_node_and_index() {
        let mut wire = Vec::new();
        Message::UpdateFingerTable(node(42, 9001), 17)
            .write(&mut wire)
            .unwrap();

        match Message::parse(&mut Cursor::new(wire)).unwrap() {
            Message::UpdateFingerTable(parsed, index) => {
                assert_eq!(parsed.id, Identifier::new(42));
                assert_eq!(parsed.port, 9001);
                assert_eq!(index, 17);
            }
            other => panic!("parsed into {:?}", other),
        }
    }

    #[test]
    fn unknown_command_is_rejected() {
        let mut wire = Cursor::new(b"make_coffee\n".to_vec());

        let error = Message::parse(&mut wire).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn truncated_node_is_a_short_read() {
        let mut wire = Cursor::new(b"update_suc\n42\n".to_vec());

        let error = Message::parse(&mut wire).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn malformed_integers_default_to_zero() {
        let mut wire = Cursor::new(b"query_suc banana\n".to_vec());

        match Message::parse(&mut wire).unwrap() {
            Message::QuerySuccessor(key) => assert_eq!(key, Identifier::new(0)),
            other => panic!("parsed into {:?}", other),
        }
    }
}

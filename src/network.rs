//! Networking abstraction layer for TCP connections
//!
//! This module provides some abstraction from raw TCP sockets to
//! connections allowing to exchange protocol [`Message`]s and node triples.
//! Every message exchange in the protocol uses a fresh connection, so a
//! [`Connection`] is a short-lived object. Incoming connections are
//! accepted on a dedicated thread and handled in parallel by a thread pool.
//!
//! [`Message`]: ../message/enum.Message.html
//! [`Connection`]: struct.Connection.html

use crate::message::{self, Message, MAX_LINE};
use crate::routing::Node;
use std::io::{self, BufReader, Write};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use threadpool::ThreadPool;

/// A connection between two peers carrying one message exchange
pub struct Connection {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Connection {
    /// Opens a TCP connection to a remote peer.
    ///
    /// `timeout_ms` bounds both read and write operations, so a stalling
    /// peer surfaces as an I/O error instead of blocking a thread forever.
    pub fn open<A: ToSocketAddrs>(addr: A, timeout_ms: u64) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;

        let timeout = Duration::from_millis(timeout_ms);
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        Self::from_stream(stream)
    }

    fn from_stream(stream: TcpStream) -> io::Result<Self> {
        let reader = BufReader::with_capacity(MAX_LINE, stream.try_clone()?);

        Ok(Self { stream, reader })
    }

    /// Sends a request to the remote peer.
    pub fn send(&mut self, msg: &Message) -> io::Result<()> {
        msg.write(&mut self.stream)?;
        self.stream.flush()
    }

    /// Receives a request from the remote peer.
    pub fn receive(&mut self) -> io::Result<Message> {
        Message::parse(&mut self.reader)
    }

    /// Reads a node triple, the response format of the fetch and query
    /// commands.
    pub fn read_node(&mut self) -> io::Result<Node> {
        message::read_node(&mut self.reader)
    }

    /// Writes a node triple as the response to a fetch or query command.
    pub fn send_node(&mut self, node: &Node) -> io::Result<()> {
        message::write_node(&mut self.stream, node)?;
        self.stream.flush()
    }

    /// Reads a single response line, used by the search command.
    pub fn read_line(&mut self) -> io::Result<String> {
        message::read_line(&mut self.reader)
    }

    /// Writes a single response line followed by a line break.
    pub fn send_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.stream, "{}", line)?;
        self.stream.flush()
    }

    /// Shuts down the write half so the peer observes end of output.
    pub fn shutdown_write(&mut self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Write)
    }
}

/// A trait to handle incoming requests from a [`Server`].
///
/// [`Server`]: struct.Server.html
pub trait ServerHandler {
    /// A connection has been established with some remote peer.
    fn handle_connection(&self, connection: Connection);

    /// The incoming request was unsuccessful and an error was raised.
    fn handle_error(&self, error: io::Error);

    /// Dispatches an accepted stream to [`handle_connection`] or its error
    /// to [`handle_error`].
    ///
    /// [`handle_connection`]: #tymethod.handle_connection
    /// [`handle_error`]: #tymethod.handle_error
    fn handle_incoming(&self, result: io::Result<TcpStream>) {
        match result.and_then(Connection::from_stream) {
            Ok(connection) => self.handle_connection(connection),
            Err(error) => self.handle_error(error),
        }
    }
}

/// A multithreaded server waiting for connections
pub struct Server {
    handler: Arc<Box<dyn ServerHandler + Send + Sync>>,
}

impl Server {
    /// Creates a new server for the given handler.
    pub fn new(handler: Box<dyn ServerHandler + Send + Sync>) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Binds the given socket address and accepts connections on a
    /// dedicated thread.
    ///
    /// `num_workers` defines the number of worker threads which handle
    /// incoming requests in parallel.
    pub fn listen<A: ToSocketAddrs>(
        self,
        addr: A,
        num_workers: usize,
    ) -> io::Result<thread::JoinHandle<()>> {
        let listener = TcpListener::bind(addr)?;

        let handle = thread::spawn(move || {
            let pool = ThreadPool::new(num_workers);

            for result in listener.incoming() {
                let handler = Arc::clone(&self.handler);
                pool.execute(move || {
                    handler.handle_incoming(result);
                });
            }
        });

        Ok(handle)
    }
}

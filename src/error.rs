//! Custom error types
//!
//! The [`ProtocolError`] covers the ways a peer can violate the wire
//! protocol. I/O failures keep their [`io::Error`] type; a peer that closes
//! the connection before a full node triple arrived surfaces as
//! `UnexpectedEof` and is treated like an unreachable transport.
//!
//! [`ProtocolError`]: enum.ProtocolError.html
//! [`io::Error`]: ../../std/io/struct.Error.html

use std::error::Error;
use std::fmt;

/// Error type for malformed peer-to-peer requests
#[derive(Debug)]
pub enum ProtocolError {
    /// The first line of a request did not start with a known command word.
    /// Such requests are logged and the connection is dropped.
    UnknownCommand(String),
    /// A single protocol line exceeded the fixed maximum length.
    LineTooLong,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProtocolError::UnknownCommand(word) => {
                write!(f, "Unknown command word `{}`", word)
            }
            ProtocolError::LineTooLong => write!(f, "Protocol line exceeds maximum length"),
        }
    }
}

impl Error for ProtocolError {}

//! This module contains the handler for inbound peer-to-peer requests.
//!
//! The [`P2PHandler`] implements the [`ServerHandler`] trait and is used as
//! the handler of the [`Server`] instance accepting connections from other
//! ring members.
//!
//! [`P2PHandler`]: struct.P2PHandler.html
//! [`ServerHandler`]: ../network/trait.ServerHandler.html
//! [`Server`]: ../network/struct.Server.html

pub use self::p2p::P2PHandler;

mod p2p;

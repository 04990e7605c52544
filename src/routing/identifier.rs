//! Identifier arithmetic on the Chord ring.
//!
//! An [`Identifier`] is a position on an identifier circle consisting of all
//! non-negative integers modulo 2^32. Each peer obtains its identifier by
//! hashing the ASCII form of its own `host:port` address; since every peer
//! must agree on the mapping, the digest algorithm and the slice taken from
//! it are fixed for the whole ring.
//!
//! The only non-trivial operation is [`is_between`], the inclusive clockwise
//! arc membership test. All routing decisions in this crate reduce to calls
//! of this predicate; half-open and open arcs are obtained by shifting an
//! endpoint by one position, which the call sites document individually.
//!
//! [`Identifier`]: struct.Identifier.html
//! [`is_between`]: struct.Identifier.html#method.is_between

use byteorder::{ByteOrder, LittleEndian};
use ring::digest;
use std::fmt;
use std::ops::{Add, Sub};

/// Number of bits of an identifier, which is also the number of finger
/// table entries kept by every node.
pub const KEY_BITS: usize = 32;

/// Offset into the digest from which the identifier bits are taken.
const DIGEST_SLICE_OFFSET: usize = 16;

/// A position on the identifier circle
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Identifier(u32);

impl Identifier {
    /// Creates an identifier from its raw ring position.
    pub fn new(position: u32) -> Self {
        Identifier(position)
    }

    /// Returns whether this identifier lies on the clockwise arc from
    /// `first` to `second`, including both endpoints.
    ///
    /// The degenerate arc with `first == second` contains every identifier.
    ///
    /// # Examples
    ///
    /// ```
    /// # use chord::routing::identifier::Identifier;
    /// #
    /// let id = |i| Identifier::new(i);
    ///
    /// assert!(id(5).is_between(id(2), id(9)));
    /// assert!(id(1).is_between(id(200), id(9)));
    /// assert!(!id(100).is_between(id(200), id(9)));
    /// ```
    pub fn is_between(self, first: Identifier, second: Identifier) -> bool {
        let (key, a, b) = (self.0, first.0, second.0);

        if key == a || key == b || a == b {
            return true;
        }

        if a < key {
            // either the arc wraps behind us or we sit before its end
            b < a || key < b
        } else {
            key < b && b < a
        }
    }
}

/// Clockwise movement on the circle, wrapping at 2^32.
impl Add<u32> for Identifier {
    type Output = Identifier;

    fn add(self, delta: u32) -> Identifier {
        Identifier(self.0.wrapping_add(delta))
    }
}

/// Counter-clockwise movement on the circle, wrapping at zero.
impl Sub<u32> for Identifier {
    type Output = Identifier;

    fn sub(self, delta: u32) -> Identifier {
        Identifier(self.0.wrapping_sub(delta))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Hashes `host:port` to a position on the identifier circle.
///
/// The address is digested with SHA-256 and four bytes in the middle of the
/// digest are read as a little-endian integer. The identifier travels with
/// the node on the wire, so remote peers never have to rehash.
pub fn hash_address(host: &str, port: u16) -> Identifier {
    let address = format!("{}:{}", host, port);
    let dig = digest::digest(&digest::SHA256, address.as_bytes());
    let slice = &dig.as_ref()[DIGEST_SLICE_OFFSET..DIGEST_SLICE_OFFSET + 4];

    Identifier(LittleEndian::read_u32(slice))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(position: u32) -> Identifier {
        Identifier::new(position)
    }

    /// Reference model: `k` lies on the inclusive arc from `a` to `b` iff
    /// the clockwise distance from `a` to `k` does not exceed the distance
    /// from `a` to `b`. The degenerate arc contains everything.
    fn arc_model(k: u32, a: u32, b: u32) -> bool {
        a == b || k.wrapping_sub(a) <= b.wrapping_sub(a)
    }

    #[test]
    fn arc_endpoints_are_included() {
        for &a in &[0u32, 1, 7, 200, u32::max_value()] {
            for &b in &[0u32, 3, 9, 201, u32::max_value() - 1] {
                assert!(id(a).is_between(id(a), id(b)));
                assert!(id(b).is_between(id(a), id(b)));
            }
        }
    }

    #[test]
    fn arc_matches_distance_model_exhaustively() {
        // small window around zero plus a window straddling the wrap point
        let positions: Vec<u32> = (0..16)
            .chain((0..16).map(|i| u32::max_value() - 15 + i))
            .collect();

        for &k in &positions {
            for &a in &positions {
                for &b in &positions {
                    assert_eq!(
                        id(k).is_between(id(a), id(b)),
                        arc_model(k, a, b),
                        "k={} a={} b={}",
                        k,
                        a,
                        b
                    );
                }
            }
        }
    }

    #[test]
    fn degenerate_arc_contains_everything() {
        assert!(id(123).is_between(id(7), id(7)));
        assert!(id(7).is_between(id(7), id(7)));
    }

    #[test]
    fn wrapping_arithmetic() {
        assert_eq!(id(5) + 10, id(15));
        assert_eq!(id(u32::max_value()) + 1, id(0));
        assert_eq!(id(0) - 1, id(u32::max_value()));
        assert_eq!(id(42) - 2 + 1, id(41));
    }

    #[test]
    fn finger_reuse_window() {
        // a node at 0 with first finger at 50: starts 2 and 32 fall inside
        // the window [0, 49] and may reuse the previous finger, start 64
        // falls outside and must be looked up
        assert!(id(2).is_between(id(0), id(50) - 1));
        assert!(id(32).is_between(id(0), id(50) - 1));
        assert!(!id(64).is_between(id(0), id(50) - 1));
    }

    #[test]
    fn address_hash_is_stable() {
        let first = hash_address("127.0.0.1", 9000);
        let second = hash_address("127.0.0.1", 9000);

        assert_eq!(first, second);
        assert_ne!(first, hash_address("127.0.0.1", 9001));
        assert_ne!(first, hash_address("10.0.0.1", 9000));
    }
}

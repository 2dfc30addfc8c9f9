// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error taxonomy for the peer runtime.

use std::fmt;

/// Result type for fallible peer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the codec, registry, and peer facade.
///
/// Receive-side errors (`Malformed`) never leave the receive loop; they are
/// logged and counted (see [`crate::registry::Registry::malformed_count`]).
/// Everything else here is returned to a caller.
#[derive(Debug)]
pub enum Error {
    /// Header missing its terminator, wrong field count, or a non-numeric
    /// id/seq/count field.
    Malformed(String),

    /// `publish` was called with an encoding tag other than `yaml` or
    /// `binary`.
    UnsupportedEncoding(String),

    /// `peers[name]` was read for a peer never observed on the wire.
    UnknownPeer(String),

    /// `peers[name][endpoint]` was read before any value arrived.
    NoValueYet { peer: String, endpoint: String },

    /// The bounded outbound queue was full at `publish(asynchronous)` time.
    QueueFull,

    /// Socket bind/send failure.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(reason) => write!(f, "malformed datagram: {}", reason),
            Self::UnsupportedEncoding(tag) => write!(f, "unsupported encoding: {}", tag),
            Self::UnknownPeer(name) => write!(f, "unknown peer: {}", name),
            Self::NoValueYet { peer, endpoint } => {
                write!(f, "no value yet for {}/{}", peer, endpoint)
            }
            Self::QueueFull => write!(f, "outbound queue is full"),
            Self::Io(err) => write!(f, "socket error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # ripplebus - lightweight peer-to-peer device bus
//!
//! A connectionless, best-effort real-time communication bus for devices on
//! a local network. Each peer publishes named data streams ("endpoints"),
//! discovers other peers by passive observation of their traffic, and may
//! subscribe to specific remote endpoints to receive directed, rather than
//! broadcast, delivery. Delivery is last-value-wins: a reader always sees
//! the most recently *reassembled* value for a (peer, endpoint) pair, never
//! a partial one.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use ripplebus::{Encoding, Peer};
//!
//! fn main() -> ripplebus::Result<()> {
//!     let peer = Peer::with_device_name("camera-01")?;
//!
//!     peer.subscribe("viewer-host", "controls");
//!     peer.publish("frame", vec![0u8; 4096], Encoding::Binary, false)?;
//!
//!     for name in peer.peers() {
//!         println!("known peer: {name}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------+
//! |  Application (producer / consumer of endpoint bytes) |
//! +-----------------------------------------------------+
//!              v                          ^
//! +-----------------------------------------------------+
//! |  Peer facade (peer.rs) - subscribe / publish / read  |
//! +-----------------------------------------------------+
//!              v                          ^
//! +-----------------------------------------------------+
//! |  I/O engine (engine.rs) - recv loop, send path,      |
//! |  meta heartbeat, subscriber-view maintenance         |
//! +-----------------------------------------------------+
//!              v                          ^
//! +-----------------------------------------------------+
//! |  Registry (registry.rs) - peers, endpoints,          |
//! |  reassembly buffers, last-value store                |
//! +-----------------------------------------------------+
//!              v                          ^
//! +-----------------------------------------------------+
//! |  Codec (codec.rs) - fragment header encode/decode    |
//! +-----------------------------------------------------+
//!              v                          ^
//! +-----------------------------------------------------+
//! |  Transport (transport.rs) - one shared UDP socket    |
//! +-----------------------------------------------------+
//! ```
//!
//! ## Modules overview
//!
//! - [`codec`] - wire framing: message <-> ordered fragment datagrams
//! - [`registry`] - known peers, their endpoints, and reassembly state
//! - [`engine`] - receive loop, send path, meta heartbeat
//! - [`peer`] - the object an application constructs and holds
//! - [`value`] - dynamic structured payload value for `yaml`-encoded endpoints
//! - [`config`] - wire constants and runtime-tunable peer configuration
//! - [`error`] - the crate's error taxonomy
//! - [`logging`] - optional compile-time-gated logging facade
//!
//! ## Non-goals
//!
//! Reliable delivery, ordered delivery across distinct endpoints,
//! authentication, encryption, flow control beyond a bounded send queue,
//! NAT traversal, multicast group management, and persistence across
//! restarts are explicitly out of scope. See the crate's design notes for
//! the reasoning.

#![warn(missing_docs)]

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod peer;
pub mod registry;
pub mod transport;
pub mod value;

pub use codec::Encoding;
pub use error::{Error, Result};
pub use peer::Peer;
pub use registry::{Peer as RemotePeer, StoredValue};
pub use value::Value;
pub use config::PeerConfig;

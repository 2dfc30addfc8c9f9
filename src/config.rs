// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wire constants and runtime-tunable peer configuration.
//!
//! Centralizes the fixed protocol values (port, fragment size, id-reset
//! threshold, timing) so they are never hardcoded at the call site, plus
//! [`PeerConfig`] for the handful of values an application may override.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Well-known UDP port every peer binds and sends to.
pub const WELL_KNOWN_PORT: u16 = 5999;

/// Maximum payload bytes carried by a single fragment (datagram).
pub const MAX_FRAGMENT_PAYLOAD: usize = 1000;

/// Maximum datagram size assumed reachable on a local Ethernet segment.
pub const MAX_DATAGRAM_SIZE: usize = 1500;

/// Header/payload separator byte.
pub const HEADER_SEPARATOR: u8 = b'\n';

/// A newly received transmission id replaces the stored one when it differs
/// by more than this, even if it went backward (sender-restart reset clause).
pub const ID_RESET_THRESHOLD: i64 = 10;

/// Minimum spacing between `meta` endpoint publishes.
pub const META_PUBLISH_INTERVAL: Duration = Duration::from_millis(100);

/// Socket receive timeout; bounds how long shutdown takes to notice the flag
/// and how often send-side maintenance runs.
pub const RECV_TIMEOUT: Duration = Duration::from_millis(10);

/// Capacity of the bounded outbound publish queue.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Subnet broadcast address used for undirected publishes.
pub const BROADCAST_ADDR: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 255);

/// Name of this peer's own heartbeat/subscription-table endpoint.
pub const META_ENDPOINT: &str = "meta";

/// Name of the optional startup announce endpoint.
pub const ANNOUNCE_ENDPOINT: &str = "announce";

/// Runtime-configurable half of a peer's setup, analogous in spirit to the
/// teacher's `RuntimeConfig`: the static constants above never change, these
/// do, per-peer, at construction time.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Device name this peer announces itself as. Defaults to the host's
    /// hostname when `None`.
    pub device_name: Option<String>,
    /// Whether to start the I/O engine (receive + send loops) at all.
    /// A non-listening peer can still publish synchronously.
    pub listen: bool,
    /// Broadcast a one-shot `announce` datagram right after the I/O engine
    /// starts (see spec §4.3), advertising `announce_endpoints`. Non-fatal
    /// if the send fails. A peer that doesn't yet know its endpoint names
    /// up front should leave this `false` and call [`crate::peer::Peer::announce`]
    /// once it does, instead of announcing an empty list here.
    pub announce_on_start: bool,
    /// Endpoint names to advertise in the startup announce. Only consulted
    /// when `announce_on_start` is set; an application that publishes
    /// fixed, known-in-advance endpoint names declares them here so the
    /// announce datagram carries something for a listener to pre-populate.
    pub announce_endpoints: Vec<String>,
    /// Local address to bind the shared socket to. Defaults to
    /// `0.0.0.0` (spec.md §4.3) so the peer receives traffic on every
    /// interface; a multi-homed host, or a test harness running several
    /// peers on one machine via distinct loopback aliases, may bind to a
    /// specific address instead.
    pub bind_addr: IpAddr,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            listen: true,
            announce_on_start: false,
            announce_endpoints: Vec::new(),
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

impl PeerConfig {
    /// Start from defaults and override the device name.
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    /// Start from defaults and toggle listening.
    pub fn with_listen(mut self, listen: bool) -> Self {
        self.listen = listen;
        self
    }

    /// Start from defaults and toggle the startup announce.
    pub fn with_announce_on_start(mut self, announce: bool) -> Self {
        self.announce_on_start = announce;
        self
    }

    /// Start from defaults and declare the endpoint names the startup
    /// announce should advertise.
    pub fn with_announce_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.announce_endpoints = endpoints;
        self
    }

    /// Start from defaults and bind to a specific local address instead of
    /// the wildcard `0.0.0.0`.
    pub fn with_bind_addr(mut self, addr: IpAddr) -> Self {
        self.bind_addr = addr;
        self
    }
}

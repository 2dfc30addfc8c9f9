// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Peer facade — the object an application constructs (spec.md §4.4, §6).

use crate::codec::Encoding;
use crate::config::PeerConfig;
use crate::engine::Engine;
use crate::error::Result;
use crate::registry::{Peer as RemotePeer, Registry, StoredValue};
use std::net::SocketAddr;
use std::sync::Arc;

/// A running peer: configures a device name, starts the I/O engine, and
/// exposes publish/subscribe/read access to the bus.
///
/// Shutdown is automatic on drop: the receive loop is stopped, the
/// outbound queue is discarded, and the socket is closed.
pub struct Peer {
    device_name: String,
    registry: Arc<Registry>,
    engine: Arc<Engine>,
}

impl Peer {
    /// Construct and start a peer using `config`.
    ///
    /// # Errors
    /// Returns `Error::Io` if the shared socket fails to bind — fatal at
    /// startup per spec.md §7.
    pub fn new(config: PeerConfig) -> Result<Self> {
        let device_name = config
            .device_name
            .clone()
            .unwrap_or_else(default_device_name);

        let registry = Arc::new(Registry::new());
        let engine = Engine::start(
            device_name.clone(),
            Arc::clone(&registry),
            config.listen,
            config.bind_addr,
        )?;

        let peer = Self {
            device_name,
            registry,
            engine,
        };

        if config.announce_on_start {
            peer.engine.announce(config.announce_endpoints);
        }

        Ok(peer)
    }

    /// Construct a listening peer under the given device name, defaults
    /// otherwise.
    pub fn with_device_name(name: impl Into<String>) -> Result<Self> {
        Self::new(PeerConfig::default().with_device_name(name.into()))
    }

    /// This peer's own device name (explicit, or derived from hostname).
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Declare that this peer wants `endpoint` of `remote` delivered
    /// directly rather than via broadcast. Takes at least one meta cycle
    /// (~100ms) to take effect on the remote peer (spec.md §8).
    pub fn subscribe(&self, remote: &str, endpoint: &str) {
        self.engine.subscribe(remote, endpoint);
    }

    /// Broadcast a one-shot `announce` datagram advertising `endpoints`
    /// (spec.md §4.3, §6). Unlike `PeerConfig::announce_on_start`, which
    /// fires before construction returns and so can only advertise
    /// endpoints declared up front, this lets an application announce once
    /// it actually knows what it publishes — e.g. after its first
    /// successful `publish` calls, or in response to `published_endpoints`
    /// growing. Non-fatal if the send fails.
    pub fn announce(&self, endpoints: Vec<String>) {
        self.engine.announce(endpoints);
    }

    /// Endpoint names this peer has published at least once so far.
    pub fn published_endpoints(&self) -> Vec<String> {
        self.engine.published_endpoints()
    }

    /// Publish a value for `endpoint`.
    ///
    /// Asynchronous (the default) enqueues onto the bounded outbound queue
    /// and returns immediately; synchronous sends inline on the calling
    /// thread, bypassing the queue.
    ///
    /// # Errors
    /// - [`crate::error::Error::UnsupportedEncoding`] if `encoding` isn't
    ///   `yaml`/`binary`.
    /// - [`crate::error::Error::QueueFull`] for an async publish against a
    ///   full queue.
    pub fn publish(
        &self,
        endpoint: &str,
        payload: Vec<u8>,
        encoding: Encoding,
        synchronous: bool,
    ) -> Result<()> {
        self.publish_to(endpoint, payload, encoding, synchronous, None)
    }

    /// Like [`Peer::publish`], but send to `override_addr` unconditionally,
    /// bypassing the subscribers view entirely (spec.md §9 design notes —
    /// ripplebus does not replicate the source's `addr`-parameter aliasing
    /// bug where an override is silently lost on the second subscriber).
    pub fn publish_to(
        &self,
        endpoint: &str,
        payload: Vec<u8>,
        encoding: Encoding,
        synchronous: bool,
        override_addr: Option<SocketAddr>,
    ) -> Result<()> {
        if synchronous {
            self.engine.publish_sync(endpoint, payload, encoding, override_addr)
        } else {
            self.engine.publish_async(endpoint, payload, encoding, override_addr)
        }
    }

    /// Known peer names, in no particular order.
    pub fn peers(&self) -> Vec<String> {
        self.registry.peer_names()
    }

    /// Look up a known peer by name.
    ///
    /// # Errors
    /// [`crate::error::Error::UnknownPeer`] if no datagram has been
    /// observed from `name` yet.
    pub fn peer(&self, name: &str) -> Result<Arc<RemotePeer>> {
        self.registry.peer(name)
    }

    /// `peers[name][endpoint]` — the latest value, or `NoValueYet`.
    pub fn value(&self, peer: &str, endpoint: &str) -> Result<StoredValue> {
        self.registry.value(peer, endpoint)
    }

    /// Number of malformed datagrams dropped since construction.
    pub fn malformed_count(&self) -> u64 {
        self.registry.malformed_count()
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        self.engine.shutdown();
    }
}

fn default_device_name() -> String {
    gethostname::gethostname()
        .into_string()
        .unwrap_or_else(|_| "unknown-device".to_string())
}

// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Peer registry: the set of known remote peers and their endpoints' latest
//! values, plus the subscription-derived "subscribers" view used to route
//! directed vs. broadcast sends.
//!
//! All mutation happens on the receive loop (spec.md §4.2, §5); readers take
//! a short-held snapshot via `DashMap`'s sharded locking, mirroring the
//! teacher's `config.rs` use of `DashMap` for its lock-free QoS store.

use crate::codec::{self, Encoding, Fragment};
use crate::error::{Error, Result};
use crate::value::{self, Value};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The fully reassembled value stored for one (peer, endpoint).
#[derive(Debug, Clone)]
pub struct StoredValue {
    pub encoding: Encoding,
    pub bytes: Vec<u8>,
    /// Present when `encoding` is [`Encoding::Yaml`] and decode succeeded.
    pub decoded: Option<Value>,
}

impl StoredValue {
    /// The decoded structured value, when this endpoint carries one.
    pub fn as_value(&self) -> Option<&Value> {
        self.decoded.as_ref()
    }
}

struct ReassemblyState {
    id: u64,
    fragments: HashMap<u32, Vec<u8>>,
    count: u32,
}

/// Remote view of one (peer, endpoint) pair.
struct Endpoint {
    current_id: AtomicU64,
    has_id: std::sync::atomic::AtomicBool,
    value: Mutex<Option<StoredValue>>,
    reassembly: Mutex<Option<ReassemblyState>>,
}

impl Endpoint {
    fn new() -> Self {
        Self {
            current_id: AtomicU64::new(0),
            has_id: std::sync::atomic::AtomicBool::new(false),
            value: Mutex::new(None),
            reassembly: Mutex::new(None),
        }
    }
}

/// A remote peer discovered by passive observation of its traffic.
pub struct Peer {
    pub name: String,
    last_addr: Mutex<SocketAddr>,
    endpoints: DashMap<String, Endpoint>,
}

impl Peer {
    fn new(name: String, addr: SocketAddr) -> Self {
        Self {
            name,
            last_addr: Mutex::new(addr),
            endpoints: DashMap::new(),
        }
    }

    /// Last observed source address for this peer.
    pub fn addr(&self) -> SocketAddr {
        *self.last_addr.lock()
    }

    /// Latest decoded value for one of this peer's endpoints, if any.
    pub fn get(&self, endpoint: &str) -> Option<StoredValue> {
        self.endpoints.get(endpoint)?.value.lock().clone()
    }

    /// Endpoint names this peer has published at least one value for.
    pub fn endpoint_names(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.key().clone()).collect()
    }
}

/// The set of known remote peers and their endpoints.
///
/// Logically owned by the receive loop: [`Registry::on_datagram`] is the
/// sole mutator. All other methods are read-only snapshots.
pub struct Registry {
    peers: DashMap<String, Arc<Peer>>,
    malformed_count: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
            malformed_count: AtomicU64::new(0),
        }
    }

    /// Decode and dispatch one inbound datagram. Malformed datagrams are
    /// counted and swallowed (spec.md §7) rather than returned as an error;
    /// the `Result` here exists for callers (tests) that want to observe the
    /// decode failure directly.
    pub fn on_datagram(&self, datagram: &[u8], from: SocketAddr) -> Result<()> {
        let fragment = match codec::decode(datagram) {
            Ok(f) => f,
            Err(err) => {
                self.malformed_count.fetch_add(1, Ordering::Relaxed);
                return Err(err);
            }
        };
        self.commit_fragment(fragment, from);
        Ok(())
    }

    fn commit_fragment(&self, fragment: Fragment, from: SocketAddr) {
        let peer = self
            .peers
            .entry(fragment.device.clone())
            .or_insert_with(|| Arc::new(Peer::new(fragment.device.clone(), from)))
            .clone();
        *peer.last_addr.lock() = from;

        let endpoint = peer
            .endpoints
            .entry(fragment.endpoint.clone())
            .or_insert_with(Endpoint::new);

        if fragment.count == 1 {
            self.commit_single(&endpoint, &fragment);
        } else {
            self.commit_multi(&endpoint, &fragment);
        }
    }

    fn commit_single(&self, endpoint: &Endpoint, fragment: &Fragment) {
        let accept = if endpoint.has_id.load(Ordering::Relaxed) {
            codec::accepts_id(endpoint.current_id.load(Ordering::Relaxed), fragment.id)
        } else {
            true
        };
        if !accept {
            return;
        }
        endpoint.current_id.store(fragment.id, Ordering::Relaxed);
        endpoint.has_id.store(true, Ordering::Relaxed);
        *endpoint.value.lock() = Some(decode_stored(fragment.encoding.clone(), fragment.bytes.clone()));
    }

    fn commit_multi(&self, endpoint: &Endpoint, fragment: &Fragment) {
        let mut reassembly = endpoint.reassembly.lock();
        let needs_reset = match reassembly.as_ref() {
            Some(state) => state.id != fragment.id,
            None => true,
        };
        if needs_reset {
            *reassembly = Some(ReassemblyState {
                id: fragment.id,
                fragments: HashMap::new(),
                count: fragment.count,
            });
        }
        let state = reassembly.as_mut().expect("just set");
        state.fragments.insert(fragment.seq, fragment.bytes.clone());

        if (0..state.count).all(|i| state.fragments.contains_key(&i)) {
            let mut payload = Vec::new();
            for i in 0..state.count {
                payload.extend_from_slice(&state.fragments[&i]);
            }
            let id = state.id;
            *reassembly = None;
            drop(reassembly);

            endpoint.current_id.store(id, Ordering::Relaxed);
            endpoint.has_id.store(true, Ordering::Relaxed);
            *endpoint.value.lock() = Some(decode_stored(fragment.encoding.clone(), payload));
        }
    }

    /// Number of datagrams dropped for being malformed since construction.
    pub fn malformed_count(&self) -> u64 {
        self.malformed_count.load(Ordering::Relaxed)
    }

    /// True if any datagram has been observed from `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.peers.contains_key(name)
    }

    /// Known peer names, in no particular order.
    pub fn peer_names(&self) -> Vec<String> {
        self.peers.iter().map(|e| e.key().clone()).collect()
    }

    /// Look up a known peer by name.
    pub fn peer(&self, name: &str) -> Result<Arc<Peer>> {
        self.peers
            .get(name)
            .map(|e| e.clone())
            .ok_or_else(|| Error::UnknownPeer(name.to_string()))
    }

    /// Latest value for `peer[name][endpoint]`.
    pub fn value(&self, peer: &str, endpoint: &str) -> Result<StoredValue> {
        let peer = self.peer(peer)?;
        peer.get(endpoint).ok_or_else(|| Error::NoValueYet {
            peer: peer.name.clone(),
            endpoint: endpoint.to_string(),
        })
    }

    /// Recompute, for each local endpoint, which remote peers have declared
    /// a subscription to it — by scanning every known peer's decoded `meta`
    /// endpoint for `subscriptions[this_device_name]` (spec.md §4.2, §4.3).
    pub fn subscribers_view(&self, this_device_name: &str) -> HashMap<String, Vec<(String, SocketAddr)>> {
        let mut out: HashMap<String, Vec<(String, SocketAddr)>> = HashMap::new();
        for entry in self.peers.iter() {
            let peer = entry.value();
            let Some(meta) = peer.get(crate::config::META_ENDPOINT) else {
                continue;
            };
            let Some(meta_value) = meta.as_value() else {
                continue;
            };
            let Some(subscriptions) = meta_value.get("subscriptions") else {
                continue;
            };
            let Some(wanted) = subscriptions.get(this_device_name) else {
                continue;
            };
            let Some(endpoints) = wanted.as_sequence() else {
                continue;
            };
            for endpoint_value in endpoints {
                if let Some(endpoint_name) = endpoint_value.as_str() {
                    out.entry(endpoint_name.to_string())
                        .or_default()
                        .push((peer.name.clone(), peer.addr()));
                }
            }
        }
        out
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_stored(encoding: Encoding, bytes: Vec<u8>) -> StoredValue {
    let decoded = if matches!(encoding, Encoding::Yaml) {
        value::decode(&bytes).ok()
    } else {
        None
    };
    StoredValue {
        encoding,
        bytes,
        decoded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)), port)
    }

    #[test]
    fn upsert_creates_peer_and_endpoint() {
        let registry = Registry::new();
        let datagrams = codec::encode("A", "t", &[0, 1, 2], Encoding::Binary, 0).unwrap();
        registry.on_datagram(&datagrams[0], addr(5999)).unwrap();

        assert!(registry.contains("A"));
        let value = registry.value("A", "t").unwrap();
        assert_eq!(value.bytes, vec![0, 1, 2]);
    }

    #[test]
    fn unknown_peer_and_no_value_yet_are_distinguished() {
        let registry = Registry::new();
        assert!(matches!(registry.peer("ghost"), Err(Error::UnknownPeer(_))));

        let datagrams = codec::encode("A", "t", b"x", Encoding::Binary, 0).unwrap();
        registry.on_datagram(&datagrams[0], addr(5999)).unwrap();
        assert!(matches!(
            registry.value("A", "other"),
            Err(Error::NoValueYet { .. })
        ));
    }

    #[test]
    fn reassembles_large_payload_only_once_complete() {
        let registry = Registry::new();
        let payload = vec![7u8; 3500];
        let datagrams = codec::encode("A", "img", &payload, Encoding::Binary, 1).unwrap();
        assert_eq!(datagrams.len(), 4);

        for datagram in &datagrams[..3] {
            registry.on_datagram(datagram, addr(5999)).unwrap();
        }
        assert!(matches!(
            registry.value("A", "img"),
            Err(Error::NoValueYet { .. })
        ));

        registry.on_datagram(&datagrams[3], addr(5999)).unwrap();
        assert_eq!(registry.value("A", "img").unwrap().bytes, payload);
    }

    #[test]
    fn out_of_order_fragments_reassemble_correctly() {
        let registry = Registry::new();
        let payload: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        let mut datagrams = codec::encode("A", "img", &payload, Encoding::Binary, 1).unwrap();
        datagrams.reverse();

        for datagram in &datagrams {
            registry.on_datagram(datagram, addr(5999)).unwrap();
        }
        assert_eq!(registry.value("A", "img").unwrap().bytes, payload);
    }

    #[test]
    fn stale_reassembly_discarded_on_new_id() {
        let registry = Registry::new();
        let payload7 = vec![1u8; 3500];
        let datagrams7 = codec::encode("A", "img", &payload7, Encoding::Binary, 7).unwrap();
        // Drop fragment index 2: only send 0, 1, 3.
        registry.on_datagram(&datagrams7[0], addr(5999)).unwrap();
        registry.on_datagram(&datagrams7[1], addr(5999)).unwrap();
        registry.on_datagram(&datagrams7[3], addr(5999)).unwrap();
        assert!(matches!(
            registry.value("A", "img"),
            Err(Error::NoValueYet { .. })
        ));

        let payload8 = vec![2u8; 2500];
        let datagrams8 = codec::encode("A", "img", &payload8, Encoding::Binary, 8).unwrap();
        for datagram in &datagrams8 {
            registry.on_datagram(datagram, addr(5999)).unwrap();
        }
        assert_eq!(registry.value("A", "img").unwrap().bytes, payload8);
    }

    #[test]
    fn sender_restart_reset_clause_accepted() {
        let registry = Registry::new();
        for id in [100u64, 101, 102] {
            let datagrams = codec::encode("A", "c", b"x", Encoding::Binary, id).unwrap();
            registry.on_datagram(&datagrams[0], addr(5999)).unwrap();
        }
        let reset = codec::encode("A", "c", b"reset", Encoding::Binary, 0).unwrap();
        registry.on_datagram(&reset[0], addr(5999)).unwrap();
        assert_eq!(registry.value("A", "c").unwrap().bytes, b"reset");
    }

    #[test]
    fn malformed_datagram_is_counted_and_dropped() {
        let registry = Registry::new();
        let bad = b"not a valid header".to_vec();
        assert!(registry.on_datagram(&bad, addr(5999)).is_err());
        assert_eq!(registry.malformed_count(), 1);
        assert!(registry.peer_names().is_empty());
    }
}

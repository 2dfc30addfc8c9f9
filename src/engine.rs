// SPDX-License-Identifier: Apache-2.0 OR MIT

//! I/O engine: the receive loop, the send path, and periodic maintenance
//! (subscriber-view recomputation, meta heartbeat) — spec.md §4.3.
//!
//! A single thread owns the socket's read side and performs send-side
//! maintenance whenever a receive times out, following the teacher's
//! pattern of interleaving periodic work with the socket's poll loop
//! (`transport/udp.rs`'s receive path) rather than a dedicated timer task —
//! spec.md §9 flags a dedicated timer as a cleaner future design.

use crate::codec::{self, Encoding};
use crate::config::{
    self, BROADCAST_ADDR, META_PUBLISH_INTERVAL, OUTBOUND_QUEUE_CAPACITY, WELL_KNOWN_PORT,
};
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::transport::Transport;
use crate::value::Value;
use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// A queued publish request (spec.md §3 "Outbound queue").
struct PublishRequest {
    endpoint: String,
    payload: Vec<u8>,
    encoding: Encoding,
    override_addr: Option<SocketAddr>,
}

/// Shared state the receive-loop thread and the peer facade both touch.
///
/// `Engine` is the single writer of the subscriber view and meta heartbeat;
/// `publish` (both sync and async) reads/writes the id counters and
/// subscription table, which are themselves safe for concurrent access
/// (`DashMap`, a `Mutex`-guarded `HashMap`).
pub struct Engine {
    transport: Arc<Transport>,
    registry: Arc<Registry>,
    device_name: String,
    sender: Sender<PublishRequest>,
    id_counters: DashMap<String, AtomicU64>,
    /// This peer's own subscription table: remote peer -> endpoints wanted.
    subscriptions: Mutex<HashMap<String, HashSet<String>>>,
    /// Cached view of who subscribes to our endpoints, refreshed each
    /// maintenance pass.
    subscribers_view: ArcSwap<HashMap<String, Vec<(String, SocketAddr)>>>,
    shutdown: Arc<AtomicBool>,
    receive_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Start the I/O engine: bind the socket and, if `listen`, spawn the
    /// receive/maintenance thread.
    pub fn start(
        device_name: String,
        registry: Arc<Registry>,
        listen: bool,
        bind_addr: std::net::IpAddr,
    ) -> Result<Arc<Self>> {
        let transport = Arc::new(Transport::bind(bind_addr)?);
        let (sender, receiver) = crossbeam_channel::bounded(OUTBOUND_QUEUE_CAPACITY);

        if let Ok(local_ip) = local_ip_address::local_ip() {
            log::info!("[engine] starting as '{}' on {}", device_name, local_ip);
        } else {
            log::info!("[engine] starting as '{}'", device_name);
        }

        let engine = Arc::new(Self {
            transport,
            registry,
            device_name,
            sender,
            id_counters: DashMap::new(),
            subscriptions: Mutex::new(HashMap::new()),
            subscribers_view: ArcSwap::from_pointee(HashMap::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            receive_thread: Mutex::new(None),
        });

        if listen {
            let worker = Arc::clone(&engine);
            let handle = std::thread::Builder::new()
                .name("ripplebus-io".to_string())
                .spawn(move || worker.run(receiver))
                .expect("spawning the receive thread should not fail");
            *engine.receive_thread.lock() = Some(handle);
        }

        Ok(engine)
    }

    fn run(&self, receiver: Receiver<PublishRequest>) {
        let mut buf = vec![0u8; config::MAX_DATAGRAM_SIZE];
        let mut heartbeat: u64 = 0;
        let mut last_meta = Instant::now() - META_PUBLISH_INTERVAL;

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.transport.recv(&mut buf) {
                Ok((len, from)) => {
                    if self.registry.on_datagram(&buf[..len], from).is_err() {
                        log::warn!("[engine] dropped malformed datagram from {}", from);
                    }
                }
                Err(err) if is_timeout(&err) => {
                    heartbeat += 1;
                    self.recompute_subscribers_view();
                    self.drain_queue(&receiver);
                    if last_meta.elapsed() >= META_PUBLISH_INTERVAL {
                        self.publish_meta(heartbeat);
                        last_meta = Instant::now();
                    }
                }
                Err(err) => {
                    log::warn!("[engine] receive error: {}", err);
                }
            }
        }
    }

    fn drain_queue(&self, receiver: &Receiver<PublishRequest>) {
        loop {
            match receiver.try_recv() {
                Ok(request) => self.dispatch(request),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn recompute_subscribers_view(&self) {
        let view = self.registry.subscribers_view(&self.device_name);
        self.subscribers_view.store(Arc::new(view));
    }

    fn publish_meta(&self, heartbeat: u64) {
        let subscriptions = self.subscriptions.lock();
        let mut table = HashMap::with_capacity(subscriptions.len());
        for (remote, endpoints) in subscriptions.iter() {
            table.insert(
                remote.clone(),
                Value::Sequence(endpoints.iter().cloned().map(Value::String).collect()),
            );
        }
        drop(subscriptions);

        let mut meta = HashMap::new();
        meta.insert("heartbeat".to_string(), Value::Int(heartbeat as i64));
        meta.insert("subscriptions".to_string(), Value::Mapping(table));

        if let Err(err) = self.publish_now(config::META_ENDPOINT, Value::Mapping(meta), None) {
            log::warn!("[engine] meta publish failed: {}", err);
        }
    }

    /// Broadcast the optional startup announce datagram (spec.md §4.3, §6).
    pub fn announce(&self, endpoints: Vec<String>) {
        let mut announce = HashMap::new();
        announce.insert("device_name".to_string(), Value::String(self.device_name.clone()));
        announce.insert(
            "endpoints".to_string(),
            Value::Sequence(endpoints.into_iter().map(Value::String).collect()),
        );
        let mut outer = HashMap::new();
        outer.insert("announce".to_string(), Value::Mapping(announce));

        if let Err(err) = self.publish_now(config::ANNOUNCE_ENDPOINT, Value::Mapping(outer), None) {
            log::warn!("[engine] announce failed: {}", err);
        }
    }

    /// Enqueue an asynchronous publish.
    ///
    /// # Errors
    /// Returns [`Error::QueueFull`] if the bounded outbound queue has no
    /// room, and [`Error::UnsupportedEncoding`] if `encoding` isn't `yaml`/
    /// `binary` — that check is deferred to send time in the source, but
    /// since the tag is known at enqueue time here, ripplebus rejects it
    /// immediately rather than silently dropping the request later.
    pub fn publish_async(
        &self,
        endpoint: &str,
        payload: Vec<u8>,
        encoding: Encoding,
        override_addr: Option<SocketAddr>,
    ) -> Result<()> {
        if matches!(encoding, Encoding::Unknown(_)) {
            return Err(Error::UnsupportedEncoding(format!("{:?}", encoding)));
        }
        self.sender
            .try_send(PublishRequest {
                endpoint: endpoint.to_string(),
                payload,
                encoding,
                override_addr,
            })
            .map_err(|_| Error::QueueFull)
    }

    /// Send a publish request inline, bypassing the outbound queue.
    pub fn publish_sync(
        &self,
        endpoint: &str,
        payload: Vec<u8>,
        encoding: Encoding,
        override_addr: Option<SocketAddr>,
    ) -> Result<()> {
        self.dispatch(PublishRequest {
            endpoint: endpoint.to_string(),
            payload,
            encoding,
            override_addr,
        });
        Ok(())
    }

    fn publish_now(&self, endpoint: &str, value: Value, override_addr: Option<SocketAddr>) -> Result<()> {
        let bytes = crate::value::encode(&value)?;
        self.dispatch(PublishRequest {
            endpoint: endpoint.to_string(),
            payload: bytes,
            encoding: Encoding::Yaml,
            override_addr,
        });
        Ok(())
    }

    fn dispatch(&self, request: PublishRequest) {
        let id = self.next_id(&request.endpoint);
        let datagrams = match codec::encode(&self.device_name, &request.endpoint, &request.payload, request.encoding, id) {
            Ok(d) => d,
            Err(err) => {
                log::warn!("[engine] encode failed for '{}': {}", request.endpoint, err);
                return;
            }
        };

        if let Some(addr) = request.override_addr {
            self.send_all(&datagrams, addr);
            return;
        }

        let view = self.subscribers_view.load();
        match view.get(&request.endpoint) {
            Some(subscribers) if !subscribers.is_empty() => {
                for (_, addr) in subscribers {
                    self.send_all(&datagrams, *addr);
                }
            }
            _ => {
                let broadcast = SocketAddr::new(BROADCAST_ADDR.into(), WELL_KNOWN_PORT);
                self.send_all(&datagrams, broadcast);
            }
        }
    }

    fn send_all(&self, datagrams: &[Vec<u8>], to: SocketAddr) {
        for datagram in datagrams {
            if let Err(err) = self.transport.send_to(datagram, to) {
                log::warn!("[engine] send to {} failed: {}", to, err);
            }
        }
    }

    fn next_id(&self, endpoint: &str) -> u64 {
        self.id_counters
            .entry(endpoint.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed)
    }

    /// Record that this peer wants `remote`'s `endpoint` delivered directly.
    pub fn subscribe(&self, remote: &str, endpoint: &str) {
        self.subscriptions
            .lock()
            .entry(remote.to_string())
            .or_default()
            .insert(endpoint.to_string());
    }

    /// Endpoint names this peer has published at least once.
    pub fn published_endpoints(&self) -> Vec<String> {
        self.id_counters.iter().map(|e| e.key().clone()).collect()
    }

    /// Signal shutdown and join the receive thread. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.receive_thread.lock().take() {
            let _ = handle.join();
        }
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

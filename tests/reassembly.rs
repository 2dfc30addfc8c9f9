// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Black-box reassembly tests against `ripplebus::registry::Registry`.
//!
//! `Registry::on_datagram` is the only mutator the spec allows (the receive
//! loop); these tests feed it hand-built datagrams to exercise permutation
//! independence, interleaved-transmission isolation, and the sender-restart
//! reset clause without needing a live socket.

use ripplebus::codec::{encode, Encoding};
use ripplebus::registry::Registry;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

fn from_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)), 5999)
}

fn make_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn permuted_fragment_delivery_yields_the_same_committed_value() {
    let payload = make_payload(3500);
    let in_order = encode("A", "img", &payload, Encoding::Binary, 1).unwrap();

    let registry_in_order = Registry::new();
    for datagram in &in_order {
        registry_in_order.on_datagram(datagram, from_addr()).unwrap();
    }

    let mut shuffled = in_order.clone();
    shuffled.swap(0, 3);
    shuffled.swap(1, 2);
    let registry_shuffled = Registry::new();
    for datagram in &shuffled {
        registry_shuffled.on_datagram(datagram, from_addr()).unwrap();
    }

    assert_eq!(
        registry_in_order.value("A", "img").unwrap().bytes,
        registry_shuffled.value("A", "img").unwrap().bytes
    );
    assert_eq!(registry_in_order.value("A", "img").unwrap().bytes, payload);
}

#[test]
fn incomplete_value_is_never_visible_before_the_final_fragment() {
    let payload = make_payload(2500);
    let datagrams = encode("A", "img", &payload, Encoding::Binary, 1).unwrap();
    assert_eq!(datagrams.len(), 3);

    let registry = Registry::new();
    for datagram in &datagrams[..2] {
        registry.on_datagram(datagram, from_addr()).unwrap();
    }
    assert!(registry.value("A", "img").is_err(), "partial state must stay invisible");

    registry.on_datagram(&datagrams[2], from_addr()).unwrap();
    assert_eq!(registry.value("A", "img").unwrap().bytes, payload);
}

#[test]
fn interleaved_transmission_ids_for_one_endpoint_never_mix_bytes() {
    let payload_a = vec![0xAAu8; 3000];
    let payload_b = vec![0xBBu8; 2000];
    let frags_a = encode("A", "img", &payload_a, Encoding::Binary, 5).unwrap();
    let frags_b = encode("A", "img", &payload_b, Encoding::Binary, 6).unwrap();

    let registry = Registry::new();
    // id=5's first fragment starts a reassembly, then id=6 arrives and,
    // per spec.md §4.2 step 1, discards it outright and completes on its
    // own.
    registry.on_datagram(&frags_a[0], from_addr()).unwrap();
    for datagram in &frags_b {
        registry.on_datagram(datagram, from_addr()).unwrap();
    }
    assert_eq!(registry.value("A", "img").unwrap().bytes, payload_b);

    // id=5's remaining fragments arrive after the fact; they start a fresh,
    // incomplete reassembly (missing fragment 0) and never commit, so the
    // endpoint's value stays at the fully-assembled id=6 payload.
    registry.on_datagram(&frags_a[1], from_addr()).unwrap();
    registry.on_datagram(&frags_a[2], from_addr()).unwrap();
    assert_eq!(
        registry.value("A", "img").unwrap().bytes,
        payload_b,
        "a later, now-incomplete id must never overwrite the committed value"
    );
}

#[test]
fn dropped_fragment_means_that_transmission_never_commits() {
    let registry = Registry::new();
    let payload7 = make_payload(3500);
    let datagrams7 = encode("A", "img", &payload7, Encoding::Binary, 7).unwrap();
    assert_eq!(datagrams7.len(), 4);

    // Drop fragment index 2.
    registry.on_datagram(&datagrams7[0], from_addr()).unwrap();
    registry.on_datagram(&datagrams7[1], from_addr()).unwrap();
    registry.on_datagram(&datagrams7[3], from_addr()).unwrap();
    assert!(registry.value("A", "img").is_err());

    let payload8 = make_payload(2500);
    let datagrams8 = encode("A", "img", &payload8, Encoding::Binary, 8).unwrap();
    for datagram in &datagrams8 {
        registry.on_datagram(datagram, from_addr()).unwrap();
    }
    assert_eq!(registry.value("A", "img").unwrap().bytes, payload8);
}

#[test]
fn single_fragment_id_comparison_rule_accepts_and_rejects_correctly() {
    let registry = Registry::new();
    for id in [100u64, 101, 102] {
        let datagrams = encode("A", "c", b"reading", Encoding::Binary, id).unwrap();
        registry.on_datagram(&datagrams[0], from_addr()).unwrap();
    }

    // id=95 is 7 less than stored 102: rejected, value stays at "reading".
    let stale = encode("A", "c", b"stale", Encoding::Binary, 95).unwrap();
    registry.on_datagram(&stale[0], from_addr()).unwrap();
    assert_eq!(registry.value("A", "c").unwrap().bytes, b"reading");

    // Sender restart: id=0 is far enough back (|0-102| > 10) to be accepted.
    let reset = encode("A", "c", b"restarted", Encoding::Binary, 0).unwrap();
    registry.on_datagram(&reset[0], from_addr()).unwrap();
    assert_eq!(registry.value("A", "c").unwrap().bytes, b"restarted");
}

#[test]
fn malformed_datagrams_are_dropped_and_counted_without_poisoning_later_state() {
    let registry = Registry::new();
    assert!(registry.on_datagram(b"garbage no header", from_addr()).is_err());
    assert_eq!(registry.malformed_count(), 1);

    let datagrams = encode("A", "t", b"ok", Encoding::Binary, 0).unwrap();
    registry.on_datagram(&datagrams[0], from_addr()).unwrap();
    assert_eq!(registry.value("A", "t").unwrap().bytes, b"ok");
    assert_eq!(registry.malformed_count(), 1);
}

// SPDX-License-Identifier: Apache-2.0 OR MIT

//! UDP socket management: one socket shared between the receive loop and the
//! send path, bound to the well-known port with address reuse, broadcast,
//! and a short receive timeout (spec.md §4.3).

use crate::config::{RECV_TIMEOUT, WELL_KNOWN_PORT};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};

/// Thin wrapper around the shared datagram socket.
///
/// Send and receive share one `UdpSocket`; the OS socket tolerates
/// concurrent read/write from separate threads without additional locking
/// (spec.md §9 design notes), so this type is `Sync` via the underlying
/// `UdpSocket`'s own thread-safety and exposes `&self` methods only.
pub struct Transport {
    socket: UdpSocket,
}

impl Transport {
    /// Bind to `addr:WELL_KNOWN_PORT` with `SO_REUSEADDR`/`SO_REUSEPORT`,
    /// broadcast enabled, and [`RECV_TIMEOUT`] as the receive timeout.
    /// `addr` is `0.0.0.0` per spec.md §4.3 unless overridden via
    /// [`crate::config::PeerConfig::bind_addr`].
    ///
    /// # Errors
    /// Returns the underlying `io::Error` on bind/configure failure; per
    /// spec.md §7 this is fatal to the peer.
    pub fn bind(addr: IpAddr) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        // SO_REUSEPORT — lets multiple peer processes share the well-known
        // port on the same host; doesn't exist on Windows.
        #[cfg(not(target_os = "windows"))]
        socket.set_reuse_port(true)?;
        let bind_addr = SocketAddr::new(addr, WELL_KNOWN_PORT);
        socket.bind(&bind_addr.into())?;
        socket.set_broadcast(true)?;
        socket.set_read_timeout(Some(RECV_TIMEOUT))?;

        log::debug!("[transport] bound {}:{}", addr, WELL_KNOWN_PORT);
        Ok(Self {
            socket: socket.into(),
        })
    }

    /// Read one datagram into `buf`, returning its length and source
    /// address. Blocks up to [`RECV_TIMEOUT`]; a timeout surfaces as
    /// `io::ErrorKind::WouldBlock`.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf)
    }

    /// Send one datagram to `to`. Failures are logged by the caller and
    /// dropped per spec.md §7; this method only performs the send.
    pub fn send_to(&self, datagram: &[u8], to: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(datagram, to)
    }
}

//! Datagram transport abstraction.
//!
//! [`Transport`] is the seam between the protocol and whatever moves
//! datagrams.  [`UdpTransport`] is a thin wrapper around
//! `tokio::net::UdpSocket`; the [`crate::simulator`] module provides
//! in-memory and fault-injecting implementations for tests.  All protocol
//! logic lives elsewhere; implementations own only byte I/O.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

/// An unreliable, message-oriented datagram transport.
///
/// Receive calls may block indefinitely; the connection bounds every call
/// with its own timeout.
pub trait Transport: Send + Sync {
    /// Send `buf` as a single datagram to `target`.
    fn send_to(
        &self,
        buf: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send;

    /// Receive the next datagram into `buf`, returning its length and sender.
    ///
    /// Datagrams larger than `buf` are truncated.
    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send;

    /// Address this transport is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// A UDP socket used as a [`Transport`].
#[derive(Debug)]
pub struct UdpTransport {
    inner: UdpSocket,
}

impl UdpTransport {
    /// Bind a new socket to `local_addr`.
    ///
    /// The address family of `local_addr` selects IPv4 or IPv6.  Passing port
    /// `0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        Ok(Self { inner })
    }
}

impl Transport for UdpTransport {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.inner.send_to(buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

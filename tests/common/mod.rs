//! Shared helpers for the integration tests.
//!
//! Most tests run both peers inside one task over a [`MemoryTransport`] pair
//! with tokio's clock paused, so timeouts fire as soon as every task is idle
//! and runs are deterministic.  [`RawPeer`] drives the far end by hand,
//! segment by segment, for scenarios a well-behaved peer never produces.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use microtcp::segment::{self, Control, Header, Segment};
use microtcp::simulator::MemoryTransport;
use microtcp::{Config, Connection, Transport};

/// Short timeouts so failure paths finish quickly.
///
/// Also routes `log` output through the test harness (`RUST_LOG=debug`).
pub fn fast_config() -> Config {
    let _ = env_logger::builder().is_test(true).try_init();
    Config {
        ack_timeout: Duration::from_millis(20),
        max_retries: 8,
        ..Config::default()
    }
}

/// Run the handshake between `client` and `server` (which must be in
/// `LISTEN`) and panic on failure.
pub async fn establish<C: Transport, S: Transport>(
    client: &mut Connection<C>,
    server: &mut Connection<S>,
) {
    let server_addr = server.local_addr().unwrap();
    let (c, s) = tokio::join!(client.connect(server_addr), server.accept());
    c.expect("client connect failed");
    s.expect("server accept failed");
}

/// Decode every captured datagram.
pub fn decode_all(transcript: &[Vec<u8>]) -> Vec<Segment> {
    transcript
        .iter()
        .map(|bytes| {
            assert!(segment::verify(bytes), "captured datagram fails checksum");
            Segment::decode(bytes).unwrap()
        })
        .collect()
}

pub fn controls(segments: &[Segment]) -> Vec<Control> {
    segments.iter().map(|s| s.header.control).collect()
}

/// A hand-driven peer speaking raw segments.
pub struct RawPeer {
    transport: MemoryTransport,
    target: SocketAddr,
}

impl RawPeer {
    pub fn new(transport: MemoryTransport) -> Self {
        let target = transport.peer_addr();
        Self { transport, target }
    }

    pub fn addr(&self) -> SocketAddr {
        self.transport.local_addr().unwrap()
    }

    pub async fn send(&self, seg: Segment) {
        self.transport.send_to(&seg.encode(), self.target).await.unwrap();
    }

    /// Send arbitrary bytes, bypassing the codec.
    pub async fn send_raw(&self, bytes: &[u8]) {
        self.transport.send_to(bytes, self.target).await.unwrap();
    }

    pub async fn send_data(&self, seq: u32, ack: u32, payload: &[u8]) {
        let header = Header::new(Control::Ack, seq, ack, 8192);
        self.send(Segment::new(header, payload.to_vec())).await;
    }

    pub async fn send_control(&self, control: Control, seq: u32, ack: u32, window: u16) {
        self.send(Segment::control(control, seq, ack, window)).await;
    }

    /// Next segment, panicking if none arrives within a generous bound.
    pub async fn recv(&self) -> Segment {
        self.try_recv(Duration::from_secs(30))
            .await
            .expect("peer received nothing")
    }

    pub async fn try_recv(&self, wait: Duration) -> Option<Segment> {
        let mut buf = vec![0u8; 65_536];
        let (n, _) = tokio::time::timeout(wait, self.transport.recv_from(&mut buf))
            .await
            .ok()?
            .unwrap();
        assert!(segment::verify(&buf[..n]));
        Some(Segment::decode(&buf[..n]).unwrap())
    }

    /// Play the server half of the handshake, advertising `window`.
    ///
    /// Returns `(client_next_seq, server_next_seq)`.
    pub async fn accept(&self, window: u16) -> (u32, u32) {
        let syn = self.recv().await;
        assert_eq!(syn.header.control, Control::Syn);
        let isn = 0x1000_0000;
        let client_next = syn.header.seq.wrapping_add(1);
        let syn_ack = Segment::new(
            Header::new(Control::SynAck, isn, client_next, window),
            vec![0; 32],
        );
        self.send(syn_ack).await;
        let ack = self.recv().await;
        assert_eq!(ack.header.control, Control::Ack);
        assert_eq!(ack.header.ack, isn + 1);
        (client_next, isn + 1)
    }

    /// Play the client half of the handshake against a listening
    /// connection, advertising `window`.
    ///
    /// Returns `(client_next_seq, server_next_seq)`.
    pub async fn connect(&self, window: u16) -> (u32, u32) {
        let isn = 0x2000_0000;
        let syn = Segment::new(Header::new(Control::Syn, isn, 0, window), vec![0; 32]);
        self.send(syn).await;
        let syn_ack = self.recv().await;
        assert_eq!(syn_ack.header.control, Control::SynAck);
        assert_eq!(syn_ack.header.ack, isn + 1);
        let server_next = syn_ack.header.seq.wrapping_add(1);
        self.send_control(Control::Ack, isn + 1, server_next, window).await;
        (isn + 1, server_next)
    }
}

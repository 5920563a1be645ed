//! Per-connection state and the I/O helpers every protocol phase shares.
//!
//! A [`Connection`] owns the complete state for one logical peer-to-peer
//! session: sequencing counters, windows, the congestion controller, the
//! receive buffer, statistics and the lifecycle state.  Fields are private
//! to the crate; the protocol operations are the only mutators:
//!
//! - [`crate::handshake`] — `connect` / `accept`
//! - [`crate::sender`] — `send`
//! - [`crate::receiver`] — `recv`
//! - [`crate::teardown`] — `shutdown`
//!
//! One caller drives a connection at a time; every operation takes
//! `&mut self`.

use std::io;
use std::net::SocketAddr;

use tokio::time::timeout;

use crate::config::{Config, MAX_DATAGRAM};
use crate::congestion::CongestionController;
use crate::error::ConnError;
use crate::receiver::ReceiveBuffer;
use crate::segment::{self, Control, Segment};
use crate::socket::{Transport, UdpTransport};
use crate::state::{ConnectionState, Role, Statistics};

/// Result of one bounded receive.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// A well-formed segment with a valid checksum from the peer.
    Segment(Segment),
    /// A datagram arrived but failed verification or decoding.
    Corrupt,
    /// Nothing arrived within the ack timeout.
    TimedOut,
}

/// A reliable connection over a datagram [`Transport`].
pub struct Connection<T> {
    pub(crate) transport: T,
    pub(crate) config: Config,
    pub(crate) role: Option<Role>,
    pub(crate) peer: Option<SocketAddr>,
    pub(crate) state: ConnectionState,

    /// Offset of the next byte we send (everything before it is acknowledged).
    pub(crate) seq_number: u32,
    /// Offset of the next byte we expect from the peer.
    pub(crate) ack_number: u32,
    /// Window the peer advertised during the handshake.
    pub(crate) init_win_size: u16,

    pub(crate) congestion: CongestionController,
    pub(crate) recv_buffer: ReceiveBuffer,
    pub(crate) stats: Statistics,

    rx_buf: Vec<u8>,
}

impl Connection<UdpTransport> {
    /// Create a connection over a UDP socket bound to `local`.
    ///
    /// Use port `0` for an ephemeral client port.  The connection starts in
    /// [`ConnectionState::Unknown`].
    pub async fn open(local: SocketAddr, config: Config) -> Result<Self, ConnError> {
        config.validate()?;
        let transport = UdpTransport::bind(local).await?;
        Self::new(transport, config)
    }

    /// Create a connection bound to `local` for a passive open.
    ///
    /// The connection starts in [`ConnectionState::Listen`].
    pub async fn bind(local: SocketAddr, config: Config) -> Result<Self, ConnError> {
        let mut conn = Self::open(local, config).await?;
        conn.listen()?;
        Ok(conn)
    }
}

impl<T: Transport> Connection<T> {
    /// Create a connection over `transport` in [`ConnectionState::Unknown`].
    pub fn new(transport: T, config: Config) -> Result<Self, ConnError> {
        config.validate()?;
        let congestion =
            CongestionController::new(config.mss, config.init_cwnd, config.init_ssthresh);
        let recv_buffer = ReceiveBuffer::new(usize::from(config.init_win_size));
        Ok(Self {
            transport,
            config,
            role: None,
            peer: None,
            state: ConnectionState::Unknown,
            seq_number: 0,
            ack_number: 0,
            init_win_size: 0,
            congestion,
            recv_buffer,
            stats: Statistics::default(),
            rx_buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    /// Prepare for a passive open.  Only valid on a fresh connection.
    pub fn listen(&mut self) -> Result<(), ConnError> {
        self.expect_state(ConnectionState::Unknown, "listen")?;
        self.state = ConnectionState::Listen;
        log::debug!("[conn] LISTEN on {:?}", self.transport.local_addr().ok());
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn seq_number(&self) -> u32 {
        self.seq_number
    }

    pub fn ack_number(&self) -> u32 {
        self.ack_number
    }

    pub fn init_win_size(&self) -> u16 {
        self.init_win_size
    }

    /// Receive window most recently advertised by the peer.
    pub fn peer_window(&self) -> usize {
        self.congestion.peer_window()
    }

    pub fn cwnd(&self) -> usize {
        self.congestion.cwnd()
    }

    pub fn ssthresh(&self) -> usize {
        self.congestion.ssthresh()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn stats(&self) -> Statistics {
        self.stats
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Shared helpers
    // -----------------------------------------------------------------------

    pub(crate) fn expect_state(
        &self,
        expected: ConnectionState,
        operation: &'static str,
    ) -> Result<(), ConnError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ConnError::BadState {
                operation,
                state: self.state,
            })
        }
    }

    /// Mark the connection unusable and hand `err` back for returning.
    pub(crate) fn fail(&mut self, err: ConnError) -> ConnError {
        log::warn!("[conn] {} -> INVALID: {err}", self.state);
        self.state = ConnectionState::Invalid;
        err
    }

    /// Window to advertise in the next outbound segment.
    pub(crate) fn advertised_window(&mut self) -> u16 {
        self.recv_buffer.advertise()
    }

    /// A payload-less segment stamped with our current offsets and window.
    pub(crate) fn ack_segment(&mut self) -> Segment {
        let window = self.advertised_window();
        Segment::control(Control::Ack, self.seq_number, self.ack_number, window)
    }

    /// Encode and send `segment` to the peer.
    ///
    /// A transport failure is fatal: the connection becomes `INVALID`.
    pub(crate) async fn transmit(&mut self, segment: &Segment) -> Result<(), ConnError> {
        let peer = self.peer.ok_or(ConnError::NotConnected)?;
        let bytes = segment.encode();
        match self.transport.send_to(&bytes, peer).await {
            Ok(_) => {
                self.stats.record_sent(bytes.len());
                log::trace!(
                    "[conn] → {} seq={} ack={} win={} len={}",
                    segment.header.control,
                    segment.header.seq,
                    segment.header.ack,
                    segment.header.window,
                    segment.payload.len()
                );
                Ok(())
            }
            Err(e) => Err(self.fail(ConnError::Io(e))),
        }
    }

    /// Wait at most one ack timeout for the next datagram from the peer.
    ///
    /// Datagrams from other addresses are skipped.  When no peer is known
    /// yet (passive open) the sender of the first well-formed segment is
    /// adopted.  A transport failure
    /// is fatal; a bad checksum is reported as [`Inbound::Corrupt`].
    pub(crate) async fn receive(&mut self) -> Result<Inbound, ConnError> {
        loop {
            let recv = self.transport.recv_from(&mut self.rx_buf);
            let (n, from) = match timeout(self.config.ack_timeout, recv).await {
                Err(_elapsed) => return Ok(Inbound::TimedOut),
                Ok(Err(e)) => return Err(self.fail(ConnError::Io(e))),
                Ok(Ok(received)) => received,
            };

            if self.peer.is_some_and(|peer| peer != from) {
                log::debug!("[conn] ignoring datagram from stranger {from}");
                continue;
            }
            self.stats.record_received(n);

            let bytes = &self.rx_buf[..n];
            if !segment::verify(bytes) {
                log::debug!("[conn] dropped {n}-byte datagram: checksum mismatch");
                self.stats.record_lost(1, n);
                return Ok(Inbound::Corrupt);
            }
            return match Segment::decode(bytes) {
                Ok(seg) => {
                    log::trace!(
                        "[conn] ← {} seq={} ack={} win={} len={}",
                        seg.header.control,
                        seg.header.seq,
                        seg.header.ack,
                        seg.header.window,
                        seg.payload.len()
                    );
                    if self.peer.is_none() {
                        log::debug!("[conn] adopting peer {from}");
                        self.peer = Some(from);
                    }
                    Ok(Inbound::Segment(seg))
                }
                Err(e) => {
                    log::debug!("[conn] dropped malformed datagram: {e}");
                    self.stats.record_lost(1, n);
                    Ok(Inbound::Corrupt)
                }
            };
        }
    }

    /// Receive until a segment arrives, retrying timeouts and dropped
    /// datagrams up to `max_retries` times.
    ///
    /// Exhausting the budget returns [`ConnError::MaxRetriesExceeded`] and
    /// leaves the state untouched; callers decide whether that is fatal.
    pub(crate) async fn await_segment(&mut self, waiting_for: &str) -> Result<Segment, ConnError> {
        let mut attempts = 0u32;
        loop {
            match self.receive().await? {
                Inbound::Segment(seg) => return Ok(seg),
                Inbound::Corrupt | Inbound::TimedOut => {
                    attempts += 1;
                    if attempts > self.config.max_retries {
                        log::warn!("[conn] gave up waiting for {waiting_for}");
                        return Err(ConnError::MaxRetriesExceeded(attempts));
                    }
                }
            }
        }
    }
}

//! Connection lifecycle types.
//!
//! This module defines every state a [`crate::connection::Connection`] can
//! occupy, the role it plays, and the I/O counters it keeps.  Transitions
//! are driven by [`crate::handshake`], [`crate::teardown`] and the data
//! transfer modules; nothing here mutates a connection.

use std::fmt;

/// All possible states of the connection lifecycle.
///
/// ```text
///  UNKNOWN ──listen──▶ LISTEN ──accept──▶ ESTABLISHED
///     │                                       ▲   │
///     └───────────────connect─────────────────┘   │ shutdown / peer FIN_ACK
///                                                 ▼
///                          CLOSING_BY_PEER ──▶ CLOSING_BY_HOST ──▶ CLOSED
///
///  any state ──protocol or I/O violation──▶ INVALID
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Freshly created; no role assigned yet.
    #[default]
    Unknown,
    /// Bound for a passive open; waiting for a SYN.
    Listen,
    /// Handshake complete; data transfer allowed.
    Established,
    /// The peer's FIN_ACK has been acknowledged (or ours has been).
    ClosingByPeer,
    /// This side's FIN_ACK has been acknowledged.
    ClosingByHost,
    /// Graceful shutdown completed.
    Closed,
    /// A protocol or transport violation occurred; discard the connection.
    Invalid,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::Listen => "LISTEN",
            Self::Established => "ESTABLISHED",
            Self::ClosingByPeer => "CLOSING_BY_PEER",
            Self::ClosingByHost => "CLOSING_BY_HOST",
            Self::Closed => "CLOSED",
            Self::Invalid => "INVALID",
        };
        f.write_str(name)
    }
}

/// Which side of the handshake this connection played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Active opener (`connect`).
    Client,
    /// Passive opener (`accept`).
    Server,
}

/// Packet and byte counters for one connection.
///
/// Every counter only ever grows.  Byte counts include the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Statistics {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
    /// Datagrams dropped on receipt (bad checksum, malformed) plus segments
    /// the sender had to retransmit.
    pub packets_lost: u64,
    pub bytes_lost: u64,
}

impl Statistics {
    pub(crate) fn record_sent(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub(crate) fn record_received(&mut self, bytes: usize) {
        self.packets_received += 1;
        self.bytes_received += bytes as u64;
    }

    pub(crate) fn record_lost(&mut self, packets: u64, bytes: usize) {
        self.packets_lost += packets;
        self.bytes_lost += bytes as u64;
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent {} pkts / {} B, received {} pkts / {} B, lost {} pkts / {} B",
            self.packets_sent,
            self.bytes_sent,
            self.packets_received,
            self.bytes_received,
            self.packets_lost,
            self.bytes_lost
        )
    }
}

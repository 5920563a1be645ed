//! Error taxonomy for connection operations.
//!
//! Checksum failures and receive timeouts never surface here: they are
//! absorbed by the retransmission machinery.  Everything in [`ConnError`] is
//! reported to the immediate caller.

use std::io;

use thiserror::Error;

use crate::segment::Control;
use crate::state::ConnectionState;

/// Errors returned by [`crate::connection::Connection`] operations.
#[derive(Debug, Error)]
pub enum ConnError {
    /// The underlying datagram send or receive failed outright.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
    /// The peer answered with the wrong control value.
    #[error("expected {expected}, received {received}")]
    UnexpectedControl { expected: Control, received: Control },
    /// The peer acknowledged the wrong sequence number.
    #[error("expected ack {expected}, received {received}")]
    AckMismatch { expected: u32, received: u32 },
    /// The operation is not allowed in the current state.
    #[error("cannot {operation} in state {state}")]
    BadState {
        operation: &'static str,
        state: ConnectionState,
    },
    /// Nothing usable arrived within the retry budget.
    #[error("peer silent after {0} receive attempts")]
    MaxRetriesExceeded(u32),
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// No peer address is known yet.
    #[error("connection has no peer")]
    NotConnected,
}

impl ConnError {
    /// `true` for errors caused by the peer misbehaving on the wire.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            ConnError::UnexpectedControl { .. } | ConnError::AckMismatch { .. }
        )
    }
}

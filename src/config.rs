//! Protocol constants and per-connection configuration.
//!
//! None of these values are negotiated on the wire; both peers are expected
//! to run with compatible settings.  [`Config::default`] reproduces the
//! constants below.

use std::time::Duration;

use crate::error::ConnError;
use crate::segment::HEADER_LEN;

/// Maximum payload carried by one segment.
pub const MSS: usize = 1400;
/// Capacity of the receive buffer.
pub const RECVBUF_LEN: usize = 8192;
/// Receive window advertised during the handshake.
pub const WIN_SIZE: u16 = RECVBUF_LEN as u16;
/// Initial congestion window.
pub const INIT_CWND: usize = 3 * MSS;
/// Initial slow-start threshold.
pub const INIT_SSTHRESH: usize = WIN_SIZE as usize;
/// Upper bound on a single receive call, in microseconds.
pub const ACK_TIMEOUT_US: u64 = 200_000;
/// Zero bytes appended to SYN and SYN_ACK.
pub const HANDSHAKE_PADDING: usize = 32;
/// Consecutive empty receives tolerated before giving up.
pub const MAX_RETRIES: u32 = 32;

/// Largest UDP payload; a segment must fit in one datagram.
pub(crate) const MAX_DATAGRAM: usize = 65_507;

/// Adjustable connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum segment size in bytes.
    pub mss: usize,
    /// Our receive buffer capacity, which is also the window we advertise.
    pub init_win_size: u16,
    /// Congestion window at the start of a connection.
    pub init_cwnd: usize,
    /// Slow-start threshold at the start of a connection.
    pub init_ssthresh: usize,
    /// Bound on every receive call.
    pub ack_timeout: Duration,
    /// Padding carried by SYN and SYN_ACK.
    pub handshake_padding: usize,
    /// Consecutive timeouts (or dropped datagrams) tolerated by any waiting
    /// loop before it fails with [`ConnError::MaxRetriesExceeded`].
    pub max_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mss: MSS,
            init_win_size: WIN_SIZE,
            init_cwnd: INIT_CWND,
            init_ssthresh: INIT_SSTHRESH,
            ack_timeout: Duration::from_micros(ACK_TIMEOUT_US),
            handshake_padding: HANDSHAKE_PADDING,
            max_retries: MAX_RETRIES,
        }
    }
}

impl Config {
    /// Check that the configuration can drive a connection.
    pub fn validate(&self) -> Result<(), ConnError> {
        let max_payload = MAX_DATAGRAM - HEADER_LEN;
        if self.mss == 0 {
            return Err(ConnError::InvalidConfig("mss must be non-zero"));
        }
        if self.mss > max_payload || self.handshake_padding > max_payload {
            return Err(ConnError::InvalidConfig("segment does not fit in a datagram"));
        }
        if self.init_win_size == 0 {
            return Err(ConnError::InvalidConfig("receive window must be non-zero"));
        }
        if self.init_cwnd == 0 {
            return Err(ConnError::InvalidConfig("initial cwnd must be non-zero"));
        }
        if self.ack_timeout.is_zero() {
            return Err(ConnError::InvalidConfig("ack timeout must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let c = Config::default();
        assert_eq!(c.mss, 1400);
        assert_eq!(c.init_win_size, 8192);
        assert_eq!(c.init_cwnd, 4200);
        assert_eq!(c.init_ssthresh, 8192);
        assert_eq!(c.ack_timeout, Duration::from_millis(200));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_values() {
        let zero_mss = Config {
            mss: 0,
            ..Config::default()
        };
        assert!(matches!(zero_mss.validate(), Err(ConnError::InvalidConfig(_))));

        let huge_mss = Config {
            mss: MAX_DATAGRAM,
            ..Config::default()
        };
        assert!(huge_mss.validate().is_err());

        let no_window = Config {
            init_win_size: 0,
            ..Config::default()
        };
        assert!(no_window.validate().is_err());

        let no_timeout = Config {
            ack_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert!(no_timeout.validate().is_err());
    }
}

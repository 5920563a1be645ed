//! Congestion and flow control.
//!
//! [`CongestionController`] owns the three numbers that bound how much the
//! sender may put on the wire: the congestion window (`cwnd`), the slow-start
//! threshold (`ssthresh`) and the receiver-advertised window.  It reacts to
//! acknowledgements and timeouts but performs no I/O; the send loop in
//! [`crate::sender`] feeds it and acts on the returned [`AckEvent`].
//!
//! # Rules
//!
//! - Admission: `min(remaining, cwnd, peer_window)`.
//! - Forward-progress ack, `cwnd <= ssthresh`: slow start, `cwnd += MSS`.
//! - Forward-progress ack, `cwnd > ssthresh`: additive increase,
//!   `cwnd += max(1, MSS * MSS / cwnd)`.
//! - Duplicate ack while `cwnd > ssthresh`: `ssthresh = cwnd / 2`,
//!   `cwnd = cwnd / 2 + 1`.
//! - Third duplicate ack: fast retransmit, `ssthresh = cwnd / 2`,
//!   `cwnd = min(MSS, ssthresh)`.
//! - Timeout: same reduction as fast retransmit.
//!
//! All quantities are byte counts.  `cwnd` never drops below one byte.

/// Duplicate acks that trigger fast retransmit.
pub const DUP_ACK_THRESHOLD: u32 = 3;

/// Outcome of feeding one acknowledgement to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckEvent {
    /// New data acknowledged; carries the number of bytes.
    Advanced(usize),
    /// Repeats the last acknowledged offset.
    Duplicate,
    /// Third duplicate: retransmit from the acknowledged offset now.
    FastRetransmit,
    /// Behind the acknowledged offset or beyond anything sent.
    Stale,
}

/// Sender-side window state for one connection.
#[derive(Debug, Clone)]
pub struct CongestionController {
    mss: usize,
    cwnd: usize,
    ssthresh: usize,
    peer_window: usize,
    dup_acks: u32,
}

impl CongestionController {
    pub fn new(mss: usize, init_cwnd: usize, init_ssthresh: usize) -> Self {
        Self {
            mss,
            cwnd: init_cwnd.max(1),
            ssthresh: init_ssthresh,
            peer_window: 0,
            dup_acks: 0,
        }
    }

    pub fn cwnd(&self) -> usize {
        self.cwnd
    }

    pub fn ssthresh(&self) -> usize {
        self.ssthresh
    }

    /// Receive window last advertised by the peer.
    pub fn peer_window(&self) -> usize {
        self.peer_window
    }

    pub fn set_peer_window(&mut self, window: u16) {
        self.peer_window = usize::from(window);
    }

    /// Forget any duplicates counted so far (a new connection was set up).
    pub fn reset_duplicates(&mut self) {
        self.dup_acks = 0;
    }

    /// Number of bytes the sender may transmit now.
    pub fn admit(&self, remaining: usize) -> usize {
        remaining.min(self.cwnd).min(self.peer_window)
    }

    /// Feed an acknowledgement number.
    ///
    /// `snd_una` is the oldest unacknowledged offset, `snd_nxt` the offset
    /// right after the last byte sent.
    pub fn on_ack(&mut self, ack: u32, snd_una: u32, snd_nxt: u32) -> AckEvent {
        let advanced = ack.wrapping_sub(snd_una);
        let in_flight = snd_nxt.wrapping_sub(snd_una);

        if advanced > 0 && advanced <= in_flight {
            self.dup_acks = 0;
            if self.cwnd <= self.ssthresh {
                self.cwnd += self.mss;
            } else {
                self.cwnd += (self.mss * self.mss / self.cwnd).max(1);
            }
            return AckEvent::Advanced(advanced as usize);
        }

        if ack != snd_una {
            return AckEvent::Stale;
        }

        // `snd_una` is always the last offset the peer acknowledged.
        self.dup_acks += 1;
        if self.dup_acks >= DUP_ACK_THRESHOLD {
            self.dup_acks = 0;
            self.reduce();
            return AckEvent::FastRetransmit;
        }
        if self.cwnd > self.ssthresh {
            self.ssthresh = self.cwnd / 2;
            self.cwnd = self.cwnd / 2 + 1;
        }
        AckEvent::Duplicate
    }

    /// A receive timed out while data was in flight.
    pub fn on_timeout(&mut self) {
        self.dup_acks = 0;
        self.reduce();
    }

    fn reduce(&mut self) {
        self.ssthresh = self.cwnd / 2;
        self.cwnd = self.mss.min(self.ssthresh).max(1);
    }
}

//! Inbound data path: in-order reassembly and receive-window management.
//!
//! The receiver accepts only the segment whose sequence number equals
//! `ack_number` (the next byte it expects) and fits in the buffer.
//! Anything else is discarded and answered with the unchanged cumulative
//! ack, so the sender sees duplicate acks.
//!
//! A FIN_ACK arriving while receiving is a peer-initiated shutdown and is
//! handed to [`crate::teardown`].

use std::collections::VecDeque;

use crate::connection::{Connection, Inbound};
use crate::error::ConnError;
use crate::segment::Control;
use crate::socket::Transport;
use crate::state::ConnectionState;

// ---------------------------------------------------------------------------
// ReceiveBuffer
// ---------------------------------------------------------------------------

/// Bytes delivered in order but not yet read by the application.
#[derive(Debug)]
pub struct ReceiveBuffer {
    data: VecDeque<u8>,
    capacity: usize,
    /// We told the peer our window was zero and have not yet seen it
    /// resume sending; its probes must be answered.
    owes_window_update: bool,
}

impl ReceiveBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
            owes_window_update: false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Free space, clamped to what the 16-bit window field can carry.
    pub fn window(&self) -> u16 {
        let free = self.capacity - self.data.len();
        u16::try_from(free).unwrap_or(u16::MAX)
    }

    /// Window to put on the wire; remembers when it was zero.
    pub(crate) fn advertise(&mut self) -> u16 {
        let window = self.window();
        if window == 0 {
            self.owes_window_update = true;
        }
        window
    }

    pub(crate) fn owes_window_update(&self) -> bool {
        self.owes_window_update && self.window() > 0
    }

    /// `true` if `len` more bytes fit.
    pub fn fits(&self, len: usize) -> bool {
        self.data.len() + len <= self.capacity
    }

    /// Append in-order payload.  The caller must check [`fits`] first.
    ///
    /// [`fits`]: ReceiveBuffer::fits
    pub fn push(&mut self, payload: &[u8]) {
        debug_assert!(self.fits(payload.len()), "receive buffer overflow");
        self.data.extend(payload.iter().copied());
        self.owes_window_update = false;
    }

    /// Copy up to `buf.len()` buffered bytes into `buf`, returning the count.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.data.len());
        for (dst, src) in buf[..n].iter_mut().zip(self.data.drain(..n)) {
            *dst = src;
        }
        n
    }
}

// ---------------------------------------------------------------------------
// recv
// ---------------------------------------------------------------------------

impl<T: Transport> Connection<T> {
    /// Receive up to `buf.len()` bytes from the peer.
    ///
    /// Blocks until `buf` is full, the peer shuts the connection down, or the
    /// peer stays silent for `max_retries` consecutive ack timeouts.
    /// Returns the number of bytes written into `buf`; after a peer shutdown
    /// this may be fewer than requested (possibly zero) and the connection is
    /// no longer `ESTABLISHED`.
    ///
    /// Silence with nothing delivered yields
    /// [`ConnError::MaxRetriesExceeded`] and leaves the connection usable.
    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, ConnError> {
        self.expect_state(ConnectionState::Established, "recv")?;

        let mut delivered = self.recv_buffer.read(buf);
        if delivered < buf.len() && self.recv_buffer.owes_window_update() {
            let update = self.ack_segment();
            self.transmit(&update).await?;
            log::debug!("[recv] → window update win={}", update.header.window);
        }

        let mut idle = 0u32;
        while delivered < buf.len() {
            let seg = match self.receive().await? {
                Inbound::Segment(seg) => seg,
                Inbound::Corrupt | Inbound::TimedOut => {
                    idle += 1;
                    if idle > self.config.max_retries {
                        if delivered > 0 {
                            break;
                        }
                        return Err(ConnError::MaxRetriesExceeded(idle));
                    }
                    continue;
                }
            };
            idle = 0;

            match seg.header.control {
                Control::Ack => {}
                Control::FinAck => {
                    log::debug!("[recv] ← FIN_ACK seq={}", seg.header.seq);
                    self.complete_peer_close(&seg.header).await?;
                    break;
                }
                other => {
                    log::warn!("[recv] ignoring unexpected {other}");
                    continue;
                }
            }

            if seg.payload.is_empty() {
                // Stale ack or a zero-window probe.
                if self.recv_buffer.owes_window_update() {
                    let update = self.ack_segment();
                    self.transmit(&update).await?;
                    log::debug!("[recv] probe answered win={}", update.header.window);
                }
                continue;
            }

            let len = seg.payload.len();
            if seg.header.seq == self.ack_number && self.recv_buffer.fits(len) {
                self.recv_buffer.push(&seg.payload);
                self.ack_number = self.ack_number.wrapping_add(len as u32);
                delivered += self.recv_buffer.read(&mut buf[delivered..]);
                log::debug!(
                    "[recv] ← DATA seq={} len={len} accepted (total {delivered})",
                    seg.header.seq
                );
            } else {
                log::debug!(
                    "[recv] ← DATA seq={} len={len} discarded (expected {})",
                    seg.header.seq,
                    self.ack_number
                );
            }

            let ack = self.ack_segment();
            self.transmit(&ack).await?;
        }

        Ok(delivered)
    }
}

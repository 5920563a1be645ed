//! Outbound data path: segmentation, acknowledgement collection and
//! retransmission.
//!
//! `send` works in rounds.  Each round asks the [`CongestionController`]
//! how many bytes may go out, cuts that allowance into MSS-sized segments
//! (plus one shorter trailing segment), transmits them back to back and then
//! collects one acknowledgement per segment.  `seq_number` only moves when
//! an ack advances it, so whatever a round fails to get acknowledged is
//! simply sent again by the next round.
//!
//! A round ends early on a receive timeout or on fast retransmit; both
//! shrink the congestion window first.  While the peer advertises a zero
//! window the sender transmits only empty probe segments.
//!
//! [`CongestionController`]: crate::congestion::CongestionController

use std::time::Duration;

use rand::Rng;

use crate::congestion::AckEvent;
use crate::connection::{Connection, Inbound};
use crate::error::ConnError;
use crate::segment::{Control, Header, Segment};
use crate::socket::Transport;
use crate::state::ConnectionState;

/// Split `len` bytes into `(offset, length)` chunks of at most `mss` bytes.
pub fn segment_spans(len: usize, mss: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..len)
        .step_by(mss.max(1))
        .map(move |offset| (offset, mss.min(len - offset)))
}

impl<T: Transport> Connection<T> {
    /// Reliably transfer all of `data` to the peer.
    ///
    /// Returns once every byte has been acknowledged, yielding `data.len()`.
    /// A transport failure, or `max_retries` consecutive timeouts without
    /// progress, leaves the connection `INVALID`.
    pub async fn send(&mut self, data: &[u8]) -> Result<usize, ConnError> {
        self.expect_state(ConnectionState::Established, "send")?;

        let mss = self.config.mss;
        let mut acked = 0usize;
        let mut retries = 0u32;

        while acked < data.len() {
            if self.congestion.peer_window() == 0 {
                self.probe_window(&mut retries).await?;
                continue;
            }

            let allowance = self.congestion.admit(data.len() - acked);
            let base = self.seq_number;
            let batch = &data[acked..acked + allowance];

            let mut segments = 0usize;
            for (offset, len) in segment_spans(batch.len(), mss) {
                let window = self.advertised_window();
                let header = Header::new(
                    Control::Ack,
                    base.wrapping_add(offset as u32),
                    self.ack_number,
                    window,
                );
                let seg = Segment::new(header, batch[offset..offset + len].to_vec());
                self.transmit(&seg).await?;
                segments += 1;
            }
            log::debug!(
                "[send] → {segments} segment(s) seq={base} bytes={allowance} cwnd={} win={}",
                self.congestion.cwnd(),
                self.congestion.peer_window()
            );

            let snd_nxt = base.wrapping_add(allowance as u32);
            let mut outstanding = segments;
            while outstanding > 0 {
                let seg = match self.receive().await? {
                    Inbound::Segment(seg) => seg,
                    Inbound::Corrupt => continue,
                    Inbound::TimedOut => {
                        retries += 1;
                        if retries > self.config.max_retries {
                            return Err(self.fail(ConnError::MaxRetriesExceeded(retries)));
                        }
                        self.congestion.on_timeout();
                        log::debug!(
                            "[send] timeout: cwnd={} ssthresh={}",
                            self.congestion.cwnd(),
                            self.congestion.ssthresh()
                        );
                        break;
                    }
                };
                if seg.header.control != Control::Ack || !seg.payload.is_empty() {
                    log::debug!("[send] ignoring {} while sending", seg.header.control);
                    continue;
                }

                let event = self.congestion.on_ack(seg.header.ack, self.seq_number, snd_nxt);
                if event == AckEvent::Stale {
                    log::debug!("[send] ignoring stale ack={}", seg.header.ack);
                    continue;
                }
                outstanding -= 1;
                self.congestion.set_peer_window(seg.header.window);
                match event {
                    AckEvent::Advanced(n) => {
                        self.seq_number = seg.header.ack;
                        acked += n;
                        retries = 0;
                    }
                    AckEvent::FastRetransmit => {
                        log::debug!(
                            "[send] triple duplicate ack={}: fast retransmit, cwnd={} ssthresh={}",
                            seg.header.ack,
                            self.congestion.cwnd(),
                            self.congestion.ssthresh()
                        );
                        break;
                    }
                    AckEvent::Duplicate | AckEvent::Stale => {}
                }
            }

            let unacked = snd_nxt.wrapping_sub(self.seq_number) as usize;
            if unacked > 0 {
                let lost = unacked.div_ceil(mss) as u64;
                self.stats.record_lost(lost, unacked);
                log::debug!("[send] resending {unacked} byte(s) from seq={}", self.seq_number);
            }
        }

        Ok(acked)
    }

    /// Wait a random fraction of the ack timeout, send one empty segment and
    /// pick up the window from whatever ack answers it.
    async fn probe_window(&mut self, retries: &mut u32) -> Result<(), ConnError> {
        let bound = self.config.ack_timeout.as_micros().max(1) as u64;
        let pause = Duration::from_micros(rand::rng().random_range(0..bound));
        tokio::time::sleep(pause).await;

        let probe = self.ack_segment();
        self.transmit(&probe).await?;
        log::debug!("[send] → zero-window probe seq={}", probe.header.seq);

        loop {
            match self.receive().await? {
                Inbound::Segment(seg) if seg.header.control == Control::Ack => {
                    self.congestion.set_peer_window(seg.header.window);
                    *retries = 0;
                    return Ok(());
                }
                Inbound::Segment(seg) => {
                    log::debug!("[send] ignoring {} while probing", seg.header.control);
                }
                Inbound::Corrupt => {}
                Inbound::TimedOut => {
                    *retries += 1;
                    if *retries > self.config.max_retries {
                        return Err(self.fail(ConnError::MaxRetriesExceeded(*retries)));
                    }
                    return Ok(());
                }
            }
        }
    }
}

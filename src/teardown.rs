//! Graceful shutdown.
//!
//! ```text
//!  active (client)                      passive (server)
//!    │ ── FIN_ACK seq=u ───────────────────▶ │  CLOSING_BY_PEER
//!    │ ◀──────────────── ACK ack=u+1 ─────── │
//!  CLOSING_BY_PEER, CLOSING_BY_HOST          │
//!    │ ◀──────────── FIN_ACK seq=v ───────── │  CLOSING_BY_HOST
//!    │ ── ACK seq=u+1 ack=v+1 ─────────────▶ │
//!  CLOSED                                  CLOSED
//! ```
//!
//! A server that initiates the close stops in `CLOSING_BY_HOST` once its
//! FIN_ACK is acknowledged.  A client that is closed by its server answers
//! with an ACK and is done.  Closing both ends at once is not supported.

use rand::Rng;

use crate::connection::Connection;
use crate::error::ConnError;
use crate::segment::{Control, Header, Segment};
use crate::socket::Transport;
use crate::state::{ConnectionState, Role};

impl<T: Transport> Connection<T> {
    /// Close the connection from this side.
    ///
    /// Requires `ESTABLISHED`; calling it in any other state marks the
    /// connection `INVALID`.  A client returns in `CLOSED`, a server in
    /// `CLOSING_BY_HOST`.  Any protocol violation or an unanswered FIN_ACK
    /// leaves the connection `INVALID`.
    pub async fn shutdown(&mut self) -> Result<(), ConnError> {
        if let Err(e) = self.expect_state(ConnectionState::Established, "shutdown") {
            return Err(self.fail(e));
        }

        let fin_seq: u32 = rand::rng().random();
        let window = self.advertised_window();
        let fin = Segment::control(Control::FinAck, fin_seq, self.ack_number, window);
        self.transmit(&fin).await?;
        log::debug!("[teardown] → FIN_ACK seq={fin_seq}");

        let expected = fin_seq.wrapping_add(1);
        let reply = self.await_closing("ACK of FIN_ACK", Control::Ack, expected).await?;
        self.check_reply(&reply.header, Control::Ack, expected)?;
        log::debug!("[teardown] ← ACK ack={}", reply.header.ack);

        self.state = ConnectionState::ClosingByPeer;
        log::debug!("[teardown] {}", self.state);
        self.state = ConnectionState::ClosingByHost;
        if self.role == Some(Role::Server) {
            log::info!("[teardown] close sent; peer completes separately");
            return Ok(());
        }

        let peer_fin = self
            .await_closing("peer FIN_ACK", Control::FinAck, expected)
            .await?;
        if peer_fin.header.control != Control::FinAck {
            return Err(self.fail(ConnError::UnexpectedControl {
                expected: Control::FinAck,
                received: peer_fin.header.control,
            }));
        }
        log::debug!(
            "[teardown] ← FIN_ACK seq={} ack={}",
            peer_fin.header.seq,
            peer_fin.header.ack
        );

        self.seq_number = peer_fin.header.ack;
        self.ack_number = peer_fin.header.seq.wrapping_add(1);
        let last = self.ack_segment();
        self.transmit(&last).await?;
        log::debug!("[teardown] → ACK seq={} ack={}", self.seq_number, self.ack_number);

        self.state = ConnectionState::Closed;
        log::info!("[teardown] connection closed");
        Ok(())
    }

    /// Answer a peer's FIN_ACK and run our half of the close.
    pub(crate) async fn complete_peer_close(&mut self, fin: &Header) -> Result<(), ConnError> {
        self.ack_number = fin.seq.wrapping_add(1);
        let ack = self.ack_segment();
        self.transmit(&ack).await?;
        self.state = ConnectionState::ClosingByPeer;
        log::debug!("[teardown] → ACK ack={}", self.ack_number);

        if self.role != Some(Role::Server) {
            self.state = ConnectionState::Closed;
            log::info!("[teardown] closed by peer");
            return Ok(());
        }

        let own_seq: u32 = rand::rng().random();
        let window = self.advertised_window();
        let own_fin = Segment::control(Control::FinAck, own_seq, self.ack_number, window);
        self.transmit(&own_fin).await?;
        self.state = ConnectionState::ClosingByHost;
        log::debug!("[teardown] → FIN_ACK seq={own_seq}");

        let expected = own_seq.wrapping_add(1);
        let reply = self.await_closing("final ACK", Control::Ack, expected).await?;
        self.check_reply(&reply.header, Control::Ack, expected)?;
        log::debug!("[teardown] ← ACK ack={}", reply.header.ack);

        self.state = ConnectionState::Closed;
        log::info!("[teardown] connection closed");
        Ok(())
    }

    /// Wait for the next teardown segment, expecting `want` (and, for an
    /// ACK, `ack`).
    ///
    /// Leftover data and a repeat of the peer FIN_ACK we already answered
    /// are re-acknowledged.  Pure ACKs left over from the data phase, and
    /// repeats of `ack`, are skipped.  Running out of retries
    /// marks the connection `INVALID`.
    async fn await_closing(
        &mut self,
        waiting_for: &str,
        want: Control,
        ack: u32,
    ) -> Result<Segment, ConnError> {
        loop {
            let seg = match self.await_segment(waiting_for).await {
                Ok(seg) => seg,
                Err(e) => return Err(self.fail(e)),
            };
            let h = &seg.header;
            if h.control == Control::Ack && !seg.payload.is_empty() {
                log::debug!("[teardown] re-acking leftover data seq={}", h.seq);
                let reply = self.ack_segment();
                self.transmit(&reply).await?;
                continue;
            }
            if want == Control::Ack
                && h.control == Control::FinAck
                && self.state == ConnectionState::ClosingByHost
                && h.seq.wrapping_add(1) == self.ack_number
            {
                log::debug!("[teardown] re-acking repeated FIN_ACK seq={}", h.seq);
                let reply = self.ack_segment();
                self.transmit(&reply).await?;
                continue;
            }
            if h.control != Control::Ack || (want == Control::Ack && h.ack == ack) {
                return Ok(seg);
            }
            if h.ack == ack || self.seq_number.wrapping_sub(h.ack) <= u32::from(u16::MAX) {
                log::debug!("[teardown] skipping stale ACK ack={}", h.ack);
                continue;
            }
            return Ok(seg);
        }
    }

    fn check_reply(&mut self, h: &Header, control: Control, ack: u32) -> Result<(), ConnError> {
        if h.control != control {
            return Err(self.fail(ConnError::UnexpectedControl {
                expected: control,
                received: h.control,
            }));
        }
        if h.ack != ack {
            return Err(self.fail(ConnError::AckMismatch {
                expected: ack,
                received: h.ack,
            }));
        }
        Ok(())
    }
}

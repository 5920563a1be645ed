//! Three-way connection establishment.
//!
//! ```text
//!  client                               server
//!    │ ── SYN      seq=x ─────────────────▶ │
//!    │ ◀────────── SYN_ACK seq=y ack=x+1 ── │
//!    │ ── ACK      seq=x+1 ack=y+1 ───────▶ │
//!  ESTABLISHED                         ESTABLISHED
//! ```
//!
//! Initial sequence numbers are drawn from the thread-local RNG.  Neither
//! side retransmits handshake segments; a lost one shows up as the waiting
//! side running out of receive retries.

use std::net::SocketAddr;

use rand::Rng;

use crate::connection::Connection;
use crate::error::ConnError;
use crate::segment::{Control, Header, Segment};
use crate::socket::Transport;
use crate::state::{ConnectionState, Role};

impl<T: Transport> Connection<T> {
    /// Active open: run the client half of the handshake against `peer`.
    ///
    /// On success the connection is `ESTABLISHED`.  A wrong reply marks it
    /// `INVALID`; a silent peer yields [`ConnError::MaxRetriesExceeded`] and
    /// leaves it `UNKNOWN` so the call can be repeated.
    pub async fn connect(&mut self, peer: SocketAddr) -> Result<(), ConnError> {
        self.expect_state(ConnectionState::Unknown, "connect")?;
        self.role = Some(Role::Client);
        self.peer = Some(peer);

        let isn: u32 = rand::rng().random();
        self.seq_number = isn;
        self.ack_number = 0;

        let syn = self.padded(Control::Syn, isn, 0);
        self.transmit(&syn).await?;
        log::debug!("[handshake] → SYN seq={isn}");

        let reply = self.await_segment("SYN_ACK").await?;
        let h = &reply.header;
        if h.control != Control::SynAck {
            return Err(self.fail(ConnError::UnexpectedControl {
                expected: Control::SynAck,
                received: h.control,
            }));
        }
        let expected = isn.wrapping_add(1);
        if h.ack != expected {
            return Err(self.fail(ConnError::AckMismatch {
                expected,
                received: h.ack,
            }));
        }
        log::debug!("[handshake] ← SYN_ACK seq={} ack={}", h.seq, h.ack);

        self.seq_number = h.ack;
        self.ack_number = h.seq.wrapping_add(1);
        self.init_win_size = h.window;
        self.congestion.set_peer_window(h.window);
        self.congestion.reset_duplicates();

        let ack = self.ack_segment();
        self.transmit(&ack).await?;
        log::debug!("[handshake] → ACK seq={} ack={}", self.seq_number, self.ack_number);

        self.state = ConnectionState::Established;
        log::info!("[handshake] connected to {peer}");
        Ok(())
    }

    /// Passive open: wait for a client's SYN and complete the handshake.
    ///
    /// Requires `LISTEN`.  Returns the client's address.  A wrong segment
    /// marks the connection `INVALID`; silence yields
    /// [`ConnError::MaxRetriesExceeded`] and leaves it in `LISTEN`.
    pub async fn accept(&mut self) -> Result<SocketAddr, ConnError> {
        self.expect_state(ConnectionState::Listen, "accept")?;
        self.role = Some(Role::Server);
        self.peer = None;

        let syn = self.await_segment("SYN").await?;
        let peer = self.peer.ok_or(ConnError::NotConnected)?;
        if syn.header.control != Control::Syn {
            return Err(self.fail(ConnError::UnexpectedControl {
                expected: Control::Syn,
                received: syn.header.control,
            }));
        }
        log::debug!("[handshake] ← SYN seq={} from {peer}", syn.header.seq);

        let isn: u32 = rand::rng().random();
        self.seq_number = isn;
        self.ack_number = syn.header.seq.wrapping_add(1);
        self.init_win_size = syn.header.window;
        self.congestion.set_peer_window(syn.header.window);

        let syn_ack = self.padded(Control::SynAck, isn, self.ack_number);
        self.transmit(&syn_ack).await?;
        log::debug!("[handshake] → SYN_ACK seq={isn} ack={}", self.ack_number);

        let reply = self.await_segment("ACK").await?;
        let h = &reply.header;
        if h.control != Control::Ack {
            return Err(self.fail(ConnError::UnexpectedControl {
                expected: Control::Ack,
                received: h.control,
            }));
        }
        let expected = isn.wrapping_add(1);
        if h.ack != expected {
            return Err(self.fail(ConnError::AckMismatch {
                expected,
                received: h.ack,
            }));
        }
        log::debug!("[handshake] ← ACK seq={} ack={}", h.seq, h.ack);

        self.seq_number = h.ack;
        self.congestion.set_peer_window(h.window);
        self.congestion.reset_duplicates();

        self.state = ConnectionState::Established;
        log::info!("[handshake] accepted {peer}");
        Ok(peer)
    }

    /// A handshake segment carrying `handshake_padding` zero bytes.
    fn padded(&mut self, control: Control, seq: u32, ack: u32) -> Segment {
        let window = self.advertised_window();
        let padding = vec![0u8; self.config.handshake_padding];
        Segment::new(Header::new(control, seq, ack, window), padding)
    }
}

//! `microtcp` — a small reliable byte stream implemented over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌───────────┐  ┌──────────┐  ┌──────────┐  ┌───────────┐
//!  │ handshake │  │  sender  │  │ receiver │  │ teardown  │
//!  └─────┬─────┘  └────┬─────┘  └────┬─────┘  └─────┬─────┘
//!        │             │ congestion  │              │
//!  ┌─────▼─────────────▼─────────────▼──────────────▼─────┐
//!  │                     Connection                        │
//!  │   (state, counters, windows, receive buffer, stats)   │
//!  └─────┬─────────────────────────────────────────────────┘
//!        │ encoded segments (CRC32-checked)
//!  ┌─────▼─────┐
//!  │ Transport │  UdpTransport, MemoryTransport, Simulator<T>
//!  └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`segment`]     — wire format (encode / decode / checksum)
//! - [`state`]       — lifecycle states, roles and statistics
//! - [`config`]      — protocol constants and per-connection settings
//! - [`congestion`]  — congestion window, slow-start threshold, peer window
//! - [`connection`]  — per-connection state and shared I/O helpers
//! - [`handshake`]   — `connect` / `accept`
//! - [`sender`]      — segmentation, ack collection and retransmission
//! - [`receiver`]    — in-order reassembly and receive window
//! - [`teardown`]    — four-segment shutdown
//! - [`socket`]      — the datagram transport seam
//! - [`simulator`]   — in-memory and fault-injecting transports for testing
//!
//! # Example
//!
//! ```no_run
//! use microtcp::{Config, Connection};
//!
//! # async fn run() -> Result<(), microtcp::ConnError> {
//! let mut conn = Connection::open("0.0.0.0:0".parse().unwrap(), Config::default()).await?;
//! conn.connect("127.0.0.1:9000".parse().unwrap()).await?;
//! conn.send(b"hello").await?;
//! conn.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod congestion;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod receiver;
pub mod segment;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod teardown;

pub use config::Config;
pub use connection::Connection;
pub use error::ConnError;
pub use socket::{Transport, UdpTransport};
pub use state::{ConnectionState, Role, Statistics};

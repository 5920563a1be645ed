//! Network simulation for deterministic testing.
//!
//! Real networks drop, reorder, duplicate and corrupt datagrams.  To exercise
//! the reliability mechanisms without depending on actual network conditions
//! this module provides:
//!
//! - [`MemoryTransport`] — a pair of in-process endpoints joined by
//!   channels.  Lossless, ordered and instant.
//! - [`Simulator`] — wraps any [`Transport`] and applies a configurable fault
//!   model to every outbound datagram:
//!
//! | Fault        | Description                                            |
//! |--------------|--------------------------------------------------------|
//! | Loss         | Drop a datagram with probability `loss_rate`.          |
//! | Reordering   | Hold a datagram back and release it after the next     |
//! |              | one, with probability `reorder_rate`.                  |
//! | Duplication  | Deliver a datagram twice (`duplicate_rate`).           |
//! | Corruption   | Flip one random bit (`corrupt_rate`).                  |
//!
//! Decisions come from a seeded [`StdRng`] so a failing run can be replayed.
//! Settings can be changed while a connection owns the simulator through the
//! cloneable [`FaultControls`] handle.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use crate::socket::Transport;

// ---------------------------------------------------------------------------
// MemoryTransport
// ---------------------------------------------------------------------------

type Datagram = (Vec<u8>, SocketAddr);

/// One end of an in-memory datagram link.
#[derive(Debug)]
pub struct MemoryTransport {
    local: SocketAddr,
    peer: SocketAddr,
    tx: mpsc::UnboundedSender<Datagram>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
}

impl MemoryTransport {
    /// Create two connected endpoints with distinct loopback addresses.
    pub fn pair() -> (Self, Self) {
        let a_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 10_001));
        let b_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 10_002));
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let a = Self {
            local: a_addr,
            peer: b_addr,
            tx: a_tx,
            rx: tokio::sync::Mutex::new(a_rx),
        };
        let b = Self {
            local: b_addr,
            peer: a_addr,
            tx: b_tx,
            rx: tokio::sync::Mutex::new(b_rx),
        };
        (a, b)
    }

    /// Address of the other end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Transport for MemoryTransport {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        // Like UDP, a datagram to an address nobody owns just disappears.
        if target == self.peer {
            self.tx
                .send((buf.to_vec(), self.local))
                .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        }
        Ok(buf.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut rx = self.rx.lock().await;
        let (datagram, from) = rx
            .recv()
            .await
            .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionAborted))?;
        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        Ok((n, from))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }
}

// ---------------------------------------------------------------------------
// Fault model
// ---------------------------------------------------------------------------

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulatorConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is held back behind the next one.
    pub reorder_rate: f64,
    /// Probability that a datagram is delivered twice.
    pub duplicate_rate: f64,
    /// Probability that one bit of a datagram is flipped.
    pub corrupt_rate: f64,
    /// Keep a copy of every datagram handed to the inner transport.
    pub capture: bool,
}

impl SimulatorConfig {
    /// Drop datagrams with probability `rate`, nothing else.
    pub fn lossy(rate: f64) -> Self {
        Self {
            loss_rate: rate,
            ..Self::default()
        }
    }
}

/// Counters kept by a [`Simulator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    /// Datagrams handed to the simulator.
    pub offered: u64,
    pub dropped: u64,
    pub reordered: u64,
    pub duplicated: u64,
    pub corrupted: u64,
}

#[derive(Debug)]
struct Shared {
    config: SimulatorConfig,
    stats: SimulatorStats,
    transcript: Vec<Vec<u8>>,
    rng: StdRng,
    held: Option<Datagram>,
}

/// Cloneable handle for inspecting and reconfiguring a [`Simulator`].
#[derive(Debug, Clone)]
pub struct FaultControls {
    shared: Arc<Mutex<Shared>>,
}

impl FaultControls {
    /// Replace the fault model.  Takes effect on the next datagram.
    pub fn set(&self, config: SimulatorConfig) {
        lock(&self.shared).config = config;
    }

    /// Turn every fault off, keeping the capture setting.
    pub fn heal(&self) {
        let mut shared = lock(&self.shared);
        shared.config = SimulatorConfig {
            capture: shared.config.capture,
            ..SimulatorConfig::default()
        };
    }

    pub fn stats(&self) -> SimulatorStats {
        lock(&self.shared).stats
    }

    /// Datagrams forwarded so far (only when `capture` is set), oldest first.
    pub fn transcript(&self) -> Vec<Vec<u8>> {
        lock(&self.shared).transcript.clone()
    }
}

/// What to do with one outbound datagram.
struct Plan {
    datagram: Option<Vec<u8>>,
    duplicate: bool,
    release: Option<Datagram>,
}

/// A fault-injecting wrapper around another transport.
#[derive(Debug)]
pub struct Simulator<T> {
    inner: T,
    shared: Arc<Mutex<Shared>>,
}

impl<T: Transport> Simulator<T> {
    /// Wrap `inner`, drawing fault decisions from an RNG seeded with `seed`.
    pub fn new(inner: T, config: SimulatorConfig, seed: u64) -> Self {
        let shared = Shared {
            config,
            stats: SimulatorStats::default(),
            transcript: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            held: None,
        };
        Self {
            inner,
            shared: Arc::new(Mutex::new(shared)),
        }
    }

    /// A pass-through simulator (no faults) that records every datagram.
    pub fn capturing(inner: T) -> Self {
        let config = SimulatorConfig {
            capture: true,
            ..SimulatorConfig::default()
        };
        Self::new(inner, config, 0)
    }

    pub fn controls(&self) -> FaultControls {
        FaultControls {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Decide the fate of `buf`.  Runs under the lock; performs no I/O.
    fn plan(&self, buf: &[u8], target: SocketAddr) -> Plan {
        let mut guard = lock(&self.shared);
        let shared = &mut *guard;
        let cfg = shared.config.clone();
        shared.stats.offered += 1;

        if chance(&mut shared.rng, cfg.loss_rate) {
            shared.stats.dropped += 1;
            return Plan {
                datagram: None,
                duplicate: false,
                release: None,
            };
        }

        let mut datagram = buf.to_vec();
        if !datagram.is_empty() && chance(&mut shared.rng, cfg.corrupt_rate) {
            let bit = shared.rng.random_range(0..datagram.len() * 8);
            datagram[bit / 8] ^= 1 << (bit % 8);
            shared.stats.corrupted += 1;
        }

        if shared.held.is_none() && chance(&mut shared.rng, cfg.reorder_rate) {
            shared.stats.reordered += 1;
            shared.held = Some((datagram, target));
            return Plan {
                datagram: None,
                duplicate: false,
                release: None,
            };
        }

        let duplicate = chance(&mut shared.rng, cfg.duplicate_rate);
        if duplicate {
            shared.stats.duplicated += 1;
        }
        let release = shared.held.take();

        if cfg.capture {
            shared.transcript.push(datagram.clone());
            if duplicate {
                shared.transcript.push(datagram.clone());
            }
            if let Some((held, _)) = &release {
                shared.transcript.push(held.clone());
            }
        }

        Plan {
            datagram: Some(datagram),
            duplicate,
            release,
        }
    }
}

impl<T: Transport> Transport for Simulator<T> {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        let plan = self.plan(buf, target);
        if let Some(datagram) = plan.datagram {
            self.inner.send_to(&datagram, target).await?;
            if plan.duplicate {
                self.inner.send_to(&datagram, target).await?;
            }
        }
        if let Some((held, held_target)) = plan.release {
            self.inner.send_to(&held, held_target).await?;
        }
        Ok(buf.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

fn chance(rng: &mut StdRng, p: f64) -> bool {
    p > 0.0 && rng.random_bool(p.min(1.0))
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

//! Entry point for `microtcp`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client**
//! mode.  The server accepts one connection and counts the bytes it
//! receives; the client uploads a fixed amount of data and closes.  All
//! protocol work lives in the library; `main.rs` owns only process setup
//! (logging, argument parsing).

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::Rng;

use microtcp::simulator::{Simulator, SimulatorConfig};
use microtcp::{Config, ConnError, Connection, ConnectionState, Transport, UdpTransport};

/// Reliable byte stream over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    /// Maximum segment size in bytes.
    #[arg(long, default_value_t = microtcp::config::MSS, global = true)]
    mss: usize,

    /// Receive timeout in milliseconds.
    #[arg(long, default_value_t = 200, global = true)]
    ack_timeout_ms: u64,

    /// Drop this fraction of outbound datagrams (0.0 - 1.0).
    #[arg(long, default_value_t = 0.0, global = true)]
    loss_rate: f64,
}

#[derive(Subcommand)]
enum Mode {
    /// Accept one connection and receive until the peer closes.
    Server {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
    },
    /// Connect to a server, upload data and close.
    Client {
        /// Remote server address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        server: SocketAddr,
        /// Number of bytes to upload.
        #[arg(short = 'n', long, default_value_t = 1 << 20)]
        bytes: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let config = Config {
        mss: cli.mss,
        ack_timeout: Duration::from_millis(cli.ack_timeout_ms),
        ..Config::default()
    };
    config.validate().context("invalid settings")?;

    let local = match &cli.mode {
        Mode::Server { bind } => *bind,
        Mode::Client { server, .. } if server.is_ipv6() => "[::]:0".parse()?,
        Mode::Client { .. } => "0.0.0.0:0".parse()?,
    };
    let udp = UdpTransport::bind(local)
        .await
        .with_context(|| format!("binding {local}"))?;

    if cli.loss_rate > 0.0 {
        let seed: u64 = rand::rng().random();
        log::info!("simulating {:.1}% loss (seed {seed})", cli.loss_rate * 100.0);
        let sim = Simulator::new(udp, SimulatorConfig::lossy(cli.loss_rate), seed);
        run(sim, config, cli.mode).await
    } else {
        run(udp, config, cli.mode).await
    }
}

async fn run<T: Transport>(transport: T, config: Config, mode: Mode) -> anyhow::Result<()> {
    let mut conn = Connection::new(transport, config)?;
    match mode {
        Mode::Server { .. } => serve(&mut conn).await?,
        Mode::Client { server, bytes } => upload(&mut conn, server, bytes).await?,
    }
    log::info!("{}", conn.stats());
    Ok(())
}

async fn serve<T: Transport>(conn: &mut Connection<T>) -> anyhow::Result<()> {
    conn.listen()?;
    log::info!("listening on {}", conn.local_addr()?);
    let peer = loop {
        match conn.accept().await {
            Ok(peer) => break peer,
            Err(ConnError::MaxRetriesExceeded(_)) => continue,
            Err(e) => return Err(e).context("handshake failed"),
        }
    };

    let started = Instant::now();
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0usize;
    while conn.state() == ConnectionState::Established {
        match conn.recv(&mut buf).await {
            Ok(n) => total += n,
            Err(ConnError::MaxRetriesExceeded(_)) => log::debug!("{peer} idle"),
            Err(e) => return Err(e).context("receive failed"),
        }
    }
    report("received", total, started.elapsed());
    Ok(())
}

async fn upload<T: Transport>(
    conn: &mut Connection<T>,
    server: SocketAddr,
    bytes: usize,
) -> anyhow::Result<()> {
    conn.connect(server)
        .await
        .with_context(|| format!("connecting to {server}"))?;

    let data: Vec<u8> = (0..bytes).map(|i| (i % 251) as u8).collect();
    let started = Instant::now();
    let sent = conn.send(&data).await.context("send failed")?;
    report("sent", sent, started.elapsed());

    conn.shutdown().await.context("shutdown failed")?;
    Ok(())
}

fn report(what: &str, bytes: usize, elapsed: Duration) {
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    log::info!(
        "{what} {bytes} bytes in {:.3}s ({:.1} KiB/s)",
        secs,
        bytes as f64 / 1024.0 / secs
    );
}

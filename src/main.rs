//! Entry point for `reliable-udp`.
//!
//! Parses CLI arguments and dispatches into either **sender** or **receiver**
//! mode.  All protocol work is delegated to library modules; `main.rs` owns
//! only process setup (logging, argument parsing, socket and file handles).

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::fs::File;

use reliable_udp::config::{self, FaultConfig, TransferConfig};
use reliable_udp::simulator::RandomFaults;
use reliable_udp::{Receiver, SenderSession, Socket};

/// Reliable file transfer over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand)]
enum Role {
    /// Send a file to a listening receiver.
    Sender {
        #[command(flatten)]
        link: LinkArgs,
        /// File to send.
        #[arg(short, long, default_value = "test.txt")]
        file: PathBuf,
        /// Probability of delaying a transmission (simulated reordering).
        #[arg(long, default_value_t = 0.0, env = "ARQ_REORDER")]
        reorder: f64,
        /// How long delayed transmissions are held back.
        #[arg(long, default_value_t = 100)]
        reorder_delay_ms: u64,
    },
    /// Listen for a file and save it.
    Receiver {
        #[command(flatten)]
        link: LinkArgs,
        /// Where to save the received file.
        #[arg(short, long, default_value = "received_file.txt")]
        file: PathBuf,
        /// Probability of dropping an inbound packet.
        #[arg(long, default_value_t = 0.1, env = "ARQ_LOSS")]
        loss: f64,
        /// Probability of corrupting an inbound packet.
        #[arg(long, default_value_t = 0.1, env = "ARQ_CORRUPTION")]
        corruption: f64,
        /// Give up after this long without any packet.
        #[arg(long)]
        idle_timeout_ms: Option<u64>,
    },
}

#[derive(Args)]
struct LinkArgs {
    /// Receiver IP address (bound by the receiver, targeted by the sender).
    #[arg(long, default_value = "127.0.0.1", env = "ARQ_IP")]
    ip: IpAddr,
    /// Receiver UDP port.
    #[arg(short, long, default_value_t = 5001, env = "ARQ_PORT")]
    port: u16,
    /// Datagram size in bytes, header included.
    #[arg(long, default_value_t = config::DEFAULT_PACKET_SIZE)]
    packet_size: usize,
    /// Acknowledgment timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,
    /// Retransmissions allowed per packet.
    #[arg(long, default_value_t = config::DEFAULT_MAX_RETRIES)]
    max_retries: u32,
    /// Seed for the fault simulator (random when omitted).
    #[arg(long, env = "ARQ_SEED")]
    seed: Option<u64>,
}

impl LinkArgs {
    fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    fn transfer_config(&self, idle_timeout: Option<Duration>) -> Result<TransferConfig> {
        let config = TransferConfig {
            packet_size: self.packet_size,
            ack_timeout: Duration::from_millis(self.timeout_ms),
            max_retries: self.max_retries,
            idle_timeout,
        };
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG overrides the default `info` level.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.role {
        Role::Sender {
            link,
            file,
            reorder,
            reorder_delay_ms,
        } => {
            let config = link.transfer_config(None)?;
            let faults = FaultConfig {
                reorder_probability: reorder,
                reorder_delay: Duration::from_millis(reorder_delay_ms),
                seed: link.seed,
                ..FaultConfig::none()
            };
            faults.validate()?;
            run_sender(link.addr(), file, config, faults).await
        }
        Role::Receiver {
            link,
            file,
            loss,
            corruption,
            idle_timeout_ms,
        } => {
            let config = link.transfer_config(idle_timeout_ms.map(Duration::from_millis))?;
            let faults = FaultConfig {
                loss_probability: loss,
                corruption_probability: corruption,
                seed: link.seed,
                ..FaultConfig::none()
            };
            faults.validate()?;
            run_receiver(link.addr(), file, config, faults).await
        }
    }
}

async fn run_sender(
    peer: SocketAddr,
    path: PathBuf,
    config: TransferConfig,
    faults: FaultConfig,
) -> Result<()> {
    let source = File::open(&path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;

    let local: SocketAddr = if peer.is_ipv4() {
        "0.0.0.0:0".parse()?
    } else {
        "[::]:0".parse()?
    };
    let socket = Socket::bind(local).await.context("binding sender socket")?;
    log::info!("Starting sender on {}, sending {} to {peer}", socket.local_addr, path.display());

    let mut session = SenderSession::start(Arc::new(socket), peer, config)?;
    if !faults.is_noop() {
        let delay = faults.reorder_delay;
        session = session.with_reordering(Box::new(RandomFaults::new(faults)), delay);
    }

    let report = session.transfer(source).await?;
    log::info!(
        "Sent {} bytes in {} packets ({} retransmissions, {} delayed)",
        report.bytes,
        report.packets,
        report.retransmissions,
        report.delayed
    );
    Ok(())
}

async fn run_receiver(
    bind: SocketAddr,
    path: PathBuf,
    config: TransferConfig,
    faults: FaultConfig,
) -> Result<()> {
    let socket = Socket::bind(bind)
        .await
        .with_context(|| format!("binding receiver socket on {bind}"))?;
    let mut sink = File::create(&path)
        .await
        .with_context(|| format!("creating {}", path.display()))?;
    log::info!("Starting receiver on {}, saving to {}", socket.local_addr, path.display());

    let mut receiver = Receiver::new(socket, config);
    if !faults.is_noop() {
        receiver = receiver.with_faults(Box::new(RandomFaults::new(faults)));
    }

    let report = receiver.run(&mut sink).await?;
    log::info!(
        "Received {} bytes ({} packets, {} duplicates, {} buffered, {} dropped)",
        report.bytes_written,
        report.packets_accepted,
        report.duplicates,
        report.buffered,
        report.dropped
    );
    Ok(())
}

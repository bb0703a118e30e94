//! Stop-and-wait send side.
//!
//! A [`SenderSession`] runs two concurrent tasks over one shared socket:
//!
//! ```text
//!   transfer loop                       ack listener (spawned)
//!   ─────────────                       ──────────────────────
//!   read next_seq ◀──── watch<u32> ──── owns next_seq; bumps it on the
//!   build packet                        ACK matching the packet in flight,
//!   publish in-flight seq ─ watch ────▶ drops every other ACK
//!   send, wait ≤ ack_timeout
//!   resend ≤ max_retries times
//! ```
//!
//! # Stop-and-Wait contract
//! - At most **one** packet is in flight at any moment.
//! - `next_seq` is written only by the listener, and only on an ACK for the
//!   packet currently in flight, so the transfer loop can never build a packet
//!   against a stale number and no number is ever skipped.
//! - Every wait is bounded; a packet either succeeds or aborts within
//!   `(max_retries + 1) × ack_timeout`.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::packet::{Ack, Packet};
use crate::simulator::{FaultModel, ReorderStage};
use crate::socket::{is_transient, Socket};
use crate::state::SenderState;
use crate::timer::{bounded_wait, worst_case_per_packet, WaitOutcome};

/// Totals for one completed transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Packets acknowledged, EOF included.
    pub packets: u32,
    /// Payload bytes acknowledged.
    pub bytes: u64,
    pub retransmissions: u32,
    /// Transmissions held back by the reorder simulation.
    pub delayed: u32,
}

struct Listener {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Send-side state for one file transfer.
pub struct SenderSession {
    socket: Arc<Socket>,
    peer: SocketAddr,
    config: TransferConfig,

    /// Next sequence number to send, published by the ack listener.
    next_seq: watch::Receiver<u32>,
    /// Sequence of the packet awaiting its ACK; `None` between sends.
    awaiting: watch::Sender<Option<u32>>,
    state: SenderState,
    in_flight: Option<Packet>,
    retry_count: u32,

    reorder: Option<ReorderStage>,
    reorder_delay: Duration,
    flushes: JoinSet<()>,

    listener: Option<Listener>,
    report: TransferReport,
}

impl SenderSession {
    /// Create a session and spawn its acknowledgment listener.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        socket: Arc<Socket>,
        peer: SocketAddr,
        config: TransferConfig,
    ) -> Result<Self, TransferError> {
        config.validate()?;

        let (seq_tx, seq_rx) = watch::channel(0u32);
        let (awaiting_tx, awaiting_rx) = watch::channel(None);
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(ack_listener(
            Arc::clone(&socket),
            peer,
            seq_tx,
            awaiting_rx,
            stop_rx,
        ));

        Ok(Self {
            socket,
            peer,
            config,
            next_seq: seq_rx,
            awaiting: awaiting_tx,
            state: SenderState::Idle,
            in_flight: None,
            retry_count: 0,
            reorder: None,
            reorder_delay: Duration::ZERO,
            flushes: JoinSet::new(),
            listener: Some(Listener {
                stop: stop_tx,
                handle,
            }),
            report: TransferReport::default(),
        })
    }

    /// Route transmissions through `model`'s delay decisions; held datagrams
    /// are flushed `delay` after the next transmission that goes out normally.
    pub fn with_reordering(mut self, model: Box<dyn FaultModel>, delay: Duration) -> Self {
        self.reorder = Some(ReorderStage::new(model));
        self.reorder_delay = delay;
        self
    }

    pub fn next_sequence(&self) -> u32 {
        *self.next_seq.borrow()
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn in_flight(&self) -> Option<&Packet> {
        self.in_flight.as_ref()
    }

    /// Retransmissions of the current (or last) packet.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn report(&self) -> &TransferReport {
        &self.report
    }

    /// Deliver one packet, retransmitting until it is acknowledged.
    ///
    /// Returns the sequence number the packet was sent with.  Fails with
    /// [`TransferError::Aborted`] once `max_retries` resends have timed out.
    pub async fn send(&mut self, payload: &[u8], is_eof: bool) -> Result<u32, TransferError> {
        let seq = self.next_sequence();
        let packet = if is_eof {
            Packet::eof(seq, payload.to_vec())
        } else {
            Packet::data(seq, payload.to_vec())
        };
        let datagram = packet.encode();
        self.in_flight = Some(packet);
        self.retry_count = 0;
        self.state = SenderState::AwaitingAck;

        self.awaiting.send_replace(Some(seq));
        let result = self.deliver(seq, &datagram, payload.len(), is_eof).await;
        self.awaiting.send_replace(None);
        result
    }

    /// Retransmission loop for the packet in flight.
    async fn deliver(
        &mut self,
        seq: u32,
        datagram: &[u8],
        len: usize,
        is_eof: bool,
    ) -> Result<u32, TransferError> {
        let ack_timeout = self.config.ack_timeout;
        loop {
            self.transmit(datagram).await?;
            log::debug!(
                "[sender] → {} seq={} len={} try={}",
                if is_eof { "EOF" } else { "DATA" },
                seq,
                len,
                self.retry_count + 1
            );

            let next_seq = &mut self.next_seq;
            let outcome = bounded_wait(ack_timeout, async move {
                next_seq.wait_for(|next| *next != seq).await.map(|_| ())
            })
            .await;

            match outcome {
                WaitOutcome::Ready(Ok(())) => {
                    self.state = SenderState::Acked;
                    self.in_flight = None;
                    self.report.packets += 1;
                    self.report.bytes += len as u64;
                    return Ok(seq);
                }
                WaitOutcome::Ready(Err(_)) => {
                    self.state = SenderState::Aborted;
                    return Err(TransferError::ListenerClosed);
                }
                WaitOutcome::TimedOut if self.retry_count >= self.config.max_retries => {
                    self.state = SenderState::Aborted;
                    let attempts = self.retry_count + 1;
                    log::warn!("[sender] giving up on seq={seq} after {attempts} transmissions");
                    return Err(TransferError::Aborted { seq, attempts });
                }
                WaitOutcome::TimedOut => {
                    self.retry_count += 1;
                    self.report.retransmissions += 1;
                    self.state = SenderState::Retry;
                    log::debug!(
                        "[sender] timeout on seq={seq}; retransmitting ({}/{})",
                        self.retry_count,
                        self.config.max_retries
                    );
                }
            }
        }
    }

    /// Send everything `source` yields in payload-sized chunks, then a single
    /// empty EOF packet.
    ///
    /// The acknowledgment listener is stopped before this returns, whether
    /// the transfer succeeded or aborted.
    pub async fn transfer<R>(mut self, mut source: R) -> Result<TransferReport, TransferError>
    where
        R: AsyncRead + Unpin,
    {
        log::info!(
            "[sender] transferring to {} (≤{:?} per packet)",
            self.peer,
            worst_case_per_packet(self.config.ack_timeout, self.config.max_retries)
        );
        let result = self.send_all(&mut source).await;
        self.shutdown().await;

        match result {
            Ok(()) => {
                log::info!(
                    "[sender] transfer complete: {} packets, {} bytes, {} retransmissions",
                    self.report.packets,
                    self.report.bytes,
                    self.report.retransmissions
                );
                Ok(self.report.clone())
            }
            Err(e) => {
                log::warn!("[sender] transfer failed: {e}");
                Err(e)
            }
        }
    }

    /// Stop the acknowledgment listener and discard pending delayed flushes.
    pub async fn shutdown(&mut self) {
        if let Some(listener) = self.listener.take() {
            let _ = listener.stop.send(());
            if let Err(e) = listener.handle.await {
                log::warn!("[sender] ack listener ended abnormally: {e}");
            }
        }
        self.flushes.abort_all();
    }

    async fn send_all<R>(&mut self, source: &mut R) -> Result<(), TransferError>
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = vec![0u8; self.config.payload_size()];
        loop {
            let n = read_chunk(source, &mut chunk).await?;
            if n == 0 {
                break;
            }
            self.send(&chunk[..n], false).await?;
        }
        self.send(&[], true).await?;
        Ok(())
    }

    /// Put one datagram on the wire, unless the reorder stage holds it back.
    async fn transmit(&mut self, datagram: &[u8]) -> Result<(), TransferError> {
        // Reap flushes that already went out.
        while self.flushes.try_join_next().is_some() {}

        if let Some(stage) = self.reorder.as_mut() {
            if stage.hold(datagram) {
                self.report.delayed += 1;
                return Ok(());
            }
        }

        self.socket.send_to(datagram, self.peer).await?;

        if let Some(stage) = self.reorder.as_mut() {
            let held = stage.release();
            if !held.is_empty() {
                let socket = Arc::clone(&self.socket);
                let peer = self.peer;
                let delay = self.reorder_delay;
                log::debug!("[sender] flushing {} delayed datagram(s) in {delay:?}", held.len());
                self.flushes.spawn(async move {
                    tokio::time::sleep(delay).await;
                    for datagram in held {
                        if let Err(e) = socket.send_to(&datagram, peer).await {
                            log::debug!("[sender] delayed send failed: {e}");
                        }
                    }
                });
            }
        }
        Ok(())
    }
}

/// Drain acknowledgments until told to stop.
///
/// Only an ACK for the packet currently in flight advances `next_seq`; ACKs
/// that arrive while nothing is awaited are discarded like stale ones.
///
/// Shutdown is only observed between datagrams, so an acknowledgment that
/// has been received is always fully processed.
async fn ack_listener(
    socket: Arc<Socket>,
    peer: SocketAddr,
    next_seq: watch::Sender<u32>,
    awaiting: watch::Receiver<Option<u32>>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        let (bytes, from) = tokio::select! {
            _ = &mut stop => break,
            result = socket.recv_from() => match result {
                Ok(received) => received,
                Err(e) if is_transient(&e) => {
                    log::debug!("[sender] transient receive error: {e}");
                    continue;
                }
                Err(e) => {
                    log::warn!("[sender] ack listener stopping: {e}");
                    break;
                }
            },
        };

        if from != peer {
            log::debug!("[sender] ignoring datagram from {from}");
            continue;
        }

        let ack = match Ack::decode(&bytes) {
            Ok(ack) => ack,
            Err(e) => {
                log::debug!("[sender] discarding ack: {e}");
                continue;
            }
        };

        let in_flight = *awaiting.borrow();
        let matched = next_seq.send_if_modified(|expected| {
            if in_flight == Some(ack.seq) && ack.seq == *expected {
                *expected = expected.wrapping_add(1);
                true
            } else {
                false
            }
        });

        if matched {
            log::debug!(
                "[sender] ← {} seq={}",
                if ack.eof { "EOF-ACK" } else { "ACK" },
                ack.seq
            );
        } else {
            log::debug!("[sender] ← stale ACK seq={} discarded", ack.seq);
        }
    }
    log::debug!("[sender] ack listener stopped");
}

/// Fill `buf` from `source`, stopping early only at end of input.
async fn read_chunk<R>(source: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

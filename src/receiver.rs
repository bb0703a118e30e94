//! Inbound packet sequencing, reorder buffering, and acknowledgment.
//!
//! The work is split in two layers:
//! - [`ReceiverSession`] — pure state.  Given a decoded [`Packet`] it decides
//!   what to write and which ACKs to send, returned as ordered [`Action`]s.
//!   It never touches the socket or the output sink.
//! - [`Receiver`] — the single-threaded I/O loop.  It reads datagrams, runs
//!   them through the receive-path [`FaultModel`], decodes them, feeds the
//!   session, and carries out the resulting actions.
//!
//! Only the receive loop touches the session, so no locking is involved.

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::packet::{Ack, Packet};
use crate::simulator::{FaultModel, Passthrough};
use crate::socket::{is_transient, Socket};
use crate::state::ReceiverState;
use crate::timer::{bounded_wait, WaitOutcome};

/// One side effect requested by the session, to be performed in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Append these bytes to the output.
    Write(Vec<u8>),
    /// Send this acknowledgment back to the sender.
    Ack(Ack),
}

/// How an arriving packet related to the expected sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Accepted in order; `flushed` buffered packets followed it out.
    InOrder { flushed: usize },
    /// Ahead of the expected sequence; `newly_buffered` is false for a
    /// repeat of an already buffered packet.
    Early { newly_buffered: bool },
    /// Behind the expected sequence (duplicate or stale).
    Stale,
    /// Arrived after the session terminated.
    AfterEof,
}

/// Outcome of feeding one packet to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reception {
    pub arrival: Arrival,
    pub actions: Vec<Action>,
}

/// Receive-side protocol state.
#[derive(Debug, Default)]
pub struct ReceiverSession {
    expected_seq: u32,
    /// Packets that arrived before their predecessors, keyed by sequence.
    reorder_buffer: HashMap<u32, Packet>,
    state: ReceiverState,
}

impl ReceiverSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expected_sequence(&self) -> u32 {
        self.expected_seq
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == ReceiverState::Terminated
    }

    pub fn buffered(&self) -> usize {
        self.reorder_buffer.len()
    }

    /// Process one decoded packet.
    pub fn on_packet(&mut self, packet: Packet) -> Reception {
        if self.is_terminated() {
            return Reception {
                arrival: Arrival::AfterEof,
                actions: Vec::new(),
            };
        }

        let mut actions = Vec::new();
        let arrival = match packet.seq.cmp(&self.expected_seq) {
            std::cmp::Ordering::Equal => {
                self.accept(packet, &mut actions);
                let mut flushed = 0;
                while !self.is_terminated() {
                    match self.reorder_buffer.remove(&self.expected_seq) {
                        Some(next) => {
                            self.accept(next, &mut actions);
                            flushed += 1;
                        }
                        None => break,
                    }
                }
                Arrival::InOrder { flushed }
            }
            std::cmp::Ordering::Greater => {
                let newly_buffered = !self.reorder_buffer.contains_key(&packet.seq);
                if newly_buffered {
                    self.reorder_buffer.insert(packet.seq, packet);
                }
                actions.extend(self.last_good_ack().map(Action::Ack));
                Arrival::Early { newly_buffered }
            }
            std::cmp::Ordering::Less => {
                actions.extend(self.last_good_ack().map(Action::Ack));
                Arrival::Stale
            }
        };

        Reception { arrival, actions }
    }

    /// Write then acknowledge an in-order packet.
    fn accept(&mut self, packet: Packet, actions: &mut Vec<Action>) {
        let seq = packet.seq;
        let eof = packet.is_eof();
        actions.push(Action::Write(packet.payload));
        actions.push(Action::Ack(if eof { Ack::eof(seq) } else { Ack::data(seq) }));
        self.expected_seq = seq.wrapping_add(1);
        if eof {
            self.state = ReceiverState::Terminated;
            self.reorder_buffer.clear();
        }
    }

    /// ACK of the last in-order packet; nothing before the first one arrives.
    fn last_good_ack(&self) -> Option<Ack> {
        self.expected_seq.checked_sub(1).map(Ack::data)
    }
}

/// Totals for one receive session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveReport {
    pub bytes_written: u64,
    /// Packets written to the output, EOF included.
    pub packets_accepted: u32,
    /// Stale arrivals and repeats of already buffered packets.
    pub duplicates: u32,
    /// Packets parked in the reorder buffer.
    pub buffered: u32,
    /// Datagrams discarded by the simulated channel.
    pub dropped: u32,
    /// Datagrams too short to decode.
    pub malformed: u32,
}

/// The receive loop: socket + fault model + session.
pub struct Receiver {
    socket: Socket,
    config: TransferConfig,
    faults: Box<dyn FaultModel>,
    session: ReceiverSession,
    report: ReceiveReport,
}

impl Receiver {
    /// A receiver over a perfect channel.
    pub fn new(socket: Socket, config: TransferConfig) -> Self {
        Self {
            socket,
            config,
            faults: Box::new(Passthrough),
            session: ReceiverSession::new(),
            report: ReceiveReport::default(),
        }
    }

    /// Apply `faults` to every inbound datagram before decoding it.
    pub fn with_faults(mut self, faults: Box<dyn FaultModel>) -> Self {
        self.faults = faults;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    pub fn session(&self) -> &ReceiverSession {
        &self.session
    }

    pub fn report(&self) -> &ReceiveReport {
        &self.report
    }

    /// Receive until the EOF packet is accepted, writing in-order payloads to
    /// `sink`.  The sink is flushed before returning.
    pub async fn run<W>(&mut self, sink: &mut W) -> Result<ReceiveReport, TransferError>
    where
        W: AsyncWrite + Unpin,
    {
        log::info!("[receiver] waiting for packets on {}", self.socket.local_addr);

        while !self.session.is_terminated() {
            let received = match self.config.idle_timeout {
                Some(limit) => match bounded_wait(limit, self.socket.recv_from()).await {
                    WaitOutcome::Ready(result) => result,
                    WaitOutcome::TimedOut => return Err(TransferError::IdleTimeout(limit)),
                },
                None => self.socket.recv_from().await,
            };

            let (raw, from) = match received {
                Ok(received) => received,
                Err(e) if is_transient(&e) => {
                    log::debug!("[receiver] transient receive error: {e}");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            self.on_datagram(raw, from, sink).await?;
        }

        sink.flush().await?;
        log::info!(
            "[receiver] file received: {} bytes in {} packets",
            self.report.bytes_written,
            self.report.packets_accepted
        );
        Ok(self.report.clone())
    }

    /// Handle one raw datagram from `from`.
    ///
    /// Simulated loss and malformed datagrams are counted and otherwise
    /// ignored; no acknowledgment is sent for them.
    pub async fn on_datagram<W>(
        &mut self,
        raw: Vec<u8>,
        from: SocketAddr,
        sink: &mut W,
    ) -> Result<(), TransferError>
    where
        W: AsyncWrite + Unpin,
    {
        let Some(datagram) = self.faults.apply(raw) else {
            self.report.dropped += 1;
            return Ok(());
        };

        let packet = match Packet::decode(&datagram) {
            Ok(packet) => packet,
            Err(e) => {
                self.report.malformed += 1;
                log::debug!("[receiver] discarding datagram from {from}: {e}");
                return Ok(());
            }
        };

        let seq = packet.seq;
        let reception = self.session.on_packet(packet);
        match reception.arrival {
            Arrival::InOrder { flushed } => {
                log::debug!("[receiver] ← DATA seq={seq} in order; flushed {flushed} buffered");
            }
            Arrival::Early { newly_buffered } => {
                if newly_buffered {
                    self.report.buffered += 1;
                } else {
                    self.report.duplicates += 1;
                }
                log::debug!(
                    "[receiver] ← DATA seq={seq} early (expecting {}); buffered={}",
                    self.session.expected_sequence(),
                    self.session.buffered()
                );
            }
            Arrival::Stale => {
                self.report.duplicates += 1;
                log::debug!("[receiver] ← DATA seq={seq} duplicate");
            }
            Arrival::AfterEof => {
                log::debug!("[receiver] ← DATA seq={seq} after EOF ignored");
            }
        }

        for action in reception.actions {
            match action {
                Action::Write(bytes) => {
                    sink.write_all(&bytes).await?;
                    self.report.bytes_written += bytes.len() as u64;
                    self.report.packets_accepted += 1;
                }
                Action::Ack(ack) => send_ack(&self.socket, ack, from).await?,
            }
        }

        if self.session.is_terminated() {
            log::debug!(
                "[receiver] EOF accepted at seq={}",
                self.session.expected_sequence().wrapping_sub(1)
            );
        }
        Ok(())
    }
}

async fn send_ack(socket: &Socket, ack: Ack, to: SocketAddr) -> Result<(), TransferError> {
    match socket.send_to(&ack.encode(), to).await {
        Ok(()) => {
            log::debug!(
                "[receiver] → {} seq={}",
                if ack.eof { "EOF-ACK" } else { "ACK" },
                ack.seq
            );
            Ok(())
        }
        Err(e) if is_transient(&e) => {
            log::debug!("[receiver] ack seq={} not sent: {e}", ack.seq);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

//! Caller-visible transfer failures.
//!
//! Timeouts, duplicates, out-of-order arrivals, simulated loss, and malformed
//! datagrams are handled inside the state machines and never appear here.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum TransferError {
    /// Every transmission of `seq` went unacknowledged.
    #[error("transfer aborted: packet {seq} unacknowledged after {attempts} transmissions")]
    Aborted { seq: u32, attempts: u32 },

    /// The acknowledgment listener stopped while a packet was in flight.
    #[error("acknowledgment listener stopped unexpectedly")]
    ListenerClosed,

    /// The receiver heard nothing for the configured idle period.
    #[error("no datagram received for {0:?}")]
    IdleTimeout(Duration),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransferError {
    /// Sequence number that could not be delivered, for aborted transfers.
    pub fn aborted_seq(&self) -> Option<u32> {
        match self {
            TransferError::Aborted { seq, .. } => Some(*seq),
            _ => None,
        }
    }
}

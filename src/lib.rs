//! `reliable-udp` — ordered, exactly-once file delivery over lossy UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌────────────────────┐   DATA / EOF   ┌────────────────────┐
//!  │   SenderSession    │───────────────▶│      Receiver      │
//!  │  transfer loop     │                │  FaultModel        │
//!  │  ack listener task │◀───────────────│  ReceiverSession   │
//!  └─────────┬──────────┘      ACKs      └─────────┬──────────┘
//!            │ raw datagrams                       │
//!  ┌─────────▼──────────┐                ┌─────────▼──────────┐
//!  │   Arc<Socket>      │                │      Socket        │
//!  └────────────────────┘                └────────────────────┘
//! ```
//!
//! The protocol is stop-and-wait: one packet in flight, acknowledged by
//! sequence number, retransmitted on timeout up to a retry bound.  The
//! receiver buffers early arrivals and re-acknowledges duplicates.
//!
//! Each module has a single responsibility:
//! - [`packet`]     — wire format (serialise / deserialise)
//! - [`sender`]     — send-side state machine and ack listener
//! - [`receiver`]   — receive-side state machine and receive loop
//! - [`simulator`]  — loss / corruption / reorder fault injection
//! - [`timer`]      — bounded wait used by the retransmission loop
//! - [`state`]      — finite-state-machine types
//! - [`config`]     — transfer and fault parameters
//! - [`error`]      — caller-visible failures
//! - [`socket`]     — async UDP socket abstraction

pub mod config;
pub mod error;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;

pub use config::{FaultConfig, TransferConfig};
pub use error::TransferError;
pub use packet::{Ack, Flag, Packet, PacketError, HEADER_LEN};
pub use receiver::{ReceiveReport, Receiver, ReceiverSession};
pub use sender::{SenderSession, TransferReport};
pub use simulator::{Fault, FaultModel, Passthrough, RandomFaults, Scripted};
pub use socket::Socket;

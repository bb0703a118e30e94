//! Fault injection for exercising the protocol over an imperfect channel.
//!
//! Real networks drop, corrupt, and reorder datagrams.  To exercise the
//! reliability mechanisms without depending on actual network conditions,
//! each endpoint routes its datagrams through a [`FaultModel`]:
//!
//! | Fault       | Side     | Description                                         |
//! |-------------|----------|-----------------------------------------------------|
//! | Loss        | receiver | Drop an inbound datagram; no ACK is sent.           |
//! | Corruption  | receiver | Flip one payload byte; the header stays intact.     |
//! | Reordering  | sender   | Hold a datagram back and flush it after a delay,    |
//! |             |          | letting later transmissions overtake it.            |
//!
//! Three models are provided:
//! - [`Passthrough`] — a perfect channel (production default).
//! - [`RandomFaults`] — independent draws per datagram from a [`FaultConfig`],
//!   optionally seeded for reproducible runs.
//! - [`Scripted`] — replays a fixed list of [`Fault`] decisions, for tests
//!   that need "drop the 3rd packet only".

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::FaultConfig;
use crate::packet::HEADER_LEN;

/// Decides what the simulated channel does to each datagram.
pub trait FaultModel: Send {
    /// Receive path: returns the datagram (possibly corrupted) or `None` if
    /// it was lost.
    fn apply(&mut self, datagram: Vec<u8>) -> Option<Vec<u8>> {
        Some(datagram)
    }

    /// Send path: `true` when this transmission should be held back and
    /// delivered late.
    fn delay(&mut self, _datagram: &[u8]) -> bool {
        false
    }
}

/// Perfect channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl FaultModel for Passthrough {}

/// Flip every bit of the byte at `index` (`^= 0xFF`).
///
/// Out-of-range indices leave the datagram untouched.
pub fn corrupt_byte(mut datagram: Vec<u8>, index: usize) -> Vec<u8> {
    if let Some(byte) = datagram.get_mut(index) {
        *byte ^= 0xff;
    }
    datagram
}

// ---------------------------------------------------------------------------
// RandomFaults
// ---------------------------------------------------------------------------

/// Probabilistic faults driven by a [`FaultConfig`].
///
/// On the receive path the loss check draws first; only surviving datagrams
/// take the corruption draw.  The corrupted byte is picked from the payload
/// region so sequence numbers always survive.
pub struct RandomFaults {
    config: FaultConfig,
    rng: StdRng,
}

impl RandomFaults {
    /// Seeded from `config.seed`, or from the OS when unset.
    pub fn new(config: FaultConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { config, rng }
    }

    pub fn seeded(config: FaultConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl FaultModel for RandomFaults {
    fn apply(&mut self, datagram: Vec<u8>) -> Option<Vec<u8>> {
        if self.rng.random::<f64>() < self.config.loss_probability {
            log::debug!("[simulator] datagram lost ({} bytes)", datagram.len());
            return None;
        }
        if self.rng.random::<f64>() < self.config.corruption_probability {
            if datagram.len() <= HEADER_LEN {
                return Some(datagram);
            }
            let index = self.rng.random_range(HEADER_LEN..datagram.len());
            log::debug!("[simulator] datagram corrupted at byte {index}");
            return Some(corrupt_byte(datagram, index));
        }
        Some(datagram)
    }

    fn delay(&mut self, datagram: &[u8]) -> bool {
        let held = self.rng.random::<f64>() < self.config.reorder_probability;
        if held {
            log::debug!("[simulator] datagram delayed ({} bytes)", datagram.len());
        }
        held
    }
}

// ---------------------------------------------------------------------------
// Scripted
// ---------------------------------------------------------------------------

/// One scripted decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Deliver,
    Drop,
    /// Flip the byte at this offset of the raw datagram.
    Corrupt(usize),
    /// Hold back (send path only; delivered unchanged on the receive path).
    Delay,
}

/// Deterministic fault sequence: the n-th datagram gets the n-th [`Fault`].
///
/// Once the script runs out every datagram is delivered.
#[derive(Debug, Default, Clone)]
pub struct Scripted {
    script: VecDeque<Fault>,
}

impl Scripted {
    pub fn new(script: impl IntoIterator<Item = Fault>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    /// Drop only the `n`-th datagram (1-based).
    pub fn drop_nth(n: usize) -> Self {
        let mut script = vec![Fault::Deliver; n.saturating_sub(1)];
        script.push(Fault::Drop);
        Self::new(script)
    }

    /// Decisions not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    fn next(&mut self) -> Fault {
        self.script.pop_front().unwrap_or(Fault::Deliver)
    }
}

impl FaultModel for Scripted {
    fn apply(&mut self, datagram: Vec<u8>) -> Option<Vec<u8>> {
        match self.next() {
            Fault::Drop => None,
            Fault::Corrupt(index) => Some(corrupt_byte(datagram, index)),
            Fault::Deliver | Fault::Delay => Some(datagram),
        }
    }

    fn delay(&mut self, _datagram: &[u8]) -> bool {
        self.next() == Fault::Delay
    }
}

// ---------------------------------------------------------------------------
// ReorderStage
// ---------------------------------------------------------------------------

/// Send-side holding area for delayed datagrams.
///
/// A held datagram is not lost: the next transmission that goes out normally
/// releases everything held so far, to be flushed after a short delay.
pub struct ReorderStage {
    model: Box<dyn FaultModel>,
    held: Vec<Vec<u8>>,
}

impl ReorderStage {
    pub fn new(model: Box<dyn FaultModel>) -> Self {
        Self {
            model,
            held: Vec::new(),
        }
    }

    /// Returns `true` if `datagram` was held back instead of being sent now.
    pub fn hold(&mut self, datagram: &[u8]) -> bool {
        if self.model.delay(datagram) {
            self.held.push(datagram.to_vec());
            true
        } else {
            false
        }
    }

    /// Take every held datagram, oldest first.
    pub fn release(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.held)
    }

    pub fn held(&self) -> usize {
        self.held.len()
    }
}

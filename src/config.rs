//! Tunable transfer and fault-injection parameters.
//!
//! Both structs are plain immutable values handed to constructors, so two
//! sessions in the same process can run with different fault profiles.

use std::time::Duration;

use thiserror::Error;

use crate::packet::HEADER_LEN;

/// Packet size used when none is configured (header included).
pub const DEFAULT_PACKET_SIZE: usize = 1024;

/// Largest UDP payload over IPv4.
pub const MAX_PACKET_SIZE: usize = 65_507;

pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(2);

pub const DEFAULT_MAX_RETRIES: u32 = 5;

pub const DEFAULT_REORDER_DELAY: Duration = Duration::from_millis(100);

/// Protocol parameters shared by both roles.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferConfig {
    /// Datagram size in bytes, header included.
    pub packet_size: usize,
    /// How long the sender waits for an acknowledgment before resending.
    pub ack_timeout: Duration,
    /// Retransmissions allowed after the first send of each packet.
    pub max_retries: u32,
    /// Receiver gives up after this long without any datagram (`None` waits forever).
    pub idle_timeout: Option<Duration>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            packet_size: DEFAULT_PACKET_SIZE,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            idle_timeout: None,
        }
    }
}

impl TransferConfig {
    /// Payload bytes carried by one full packet.
    pub fn payload_size(&self) -> usize {
        self.packet_size.saturating_sub(HEADER_LEN)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.packet_size <= HEADER_LEN || self.packet_size > MAX_PACKET_SIZE {
            return Err(ConfigError::PacketSize(self.packet_size));
        }
        if self.ack_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Probabilities for the simulated imperfect channel.
///
/// Each probability applies independently to every datagram event.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultConfig {
    pub loss_probability: f64,
    pub corruption_probability: f64,
    pub reorder_probability: f64,
    /// How long held-back datagrams wait before being flushed.
    pub reorder_delay: Duration,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self::none()
    }
}

impl FaultConfig {
    /// A perfect channel.
    pub fn none() -> Self {
        Self {
            loss_probability: 0.0,
            corruption_probability: 0.0,
            reorder_probability: 0.0,
            reorder_delay: DEFAULT_REORDER_DELAY,
            seed: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.loss_probability == 0.0
            && self.corruption_probability == 0.0
            && self.reorder_probability == 0.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, p) in [
            ("loss", self.loss_probability),
            ("corruption", self.corruption_probability),
            ("reorder", self.reorder_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Probability { name, value: p });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("packet size {0} must be between {min} and {max} bytes", min = HEADER_LEN + 1, max = MAX_PACKET_SIZE)]
    PacketSize(usize),
    #[error("{name} probability {value} is outside [0, 1]")]
    Probability { name: &'static str, value: f64 },
    #[error("ack timeout must be non-zero")]
    ZeroTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(TransferConfig::default().validate().is_ok());
        assert!(FaultConfig::default().validate().is_ok());
        assert!(FaultConfig::none().is_noop());
    }

    #[test]
    fn payload_size_excludes_header() {
        let config = TransferConfig::default();
        assert_eq!(config.payload_size(), DEFAULT_PACKET_SIZE - HEADER_LEN);
    }

    #[test]
    fn header_sized_packet_rejected() {
        let config = TransferConfig {
            packet_size: HEADER_LEN,
            ..TransferConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::PacketSize(HEADER_LEN)));
    }

    #[test]
    fn oversized_packet_rejected() {
        let config = TransferConfig {
            packet_size: MAX_PACKET_SIZE + 1,
            ..TransferConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = TransferConfig {
            ack_timeout: Duration::ZERO,
            ..TransferConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn probability_out_of_range_rejected() {
        let faults = FaultConfig {
            corruption_probability: 1.5,
            ..FaultConfig::none()
        };
        assert_eq!(
            faults.validate(),
            Err(ConfigError::Probability {
                name: "corruption",
                value: 1.5
            })
        );
    }
}

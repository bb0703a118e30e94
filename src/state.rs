//! Finite-state-machine types for both protocol roles.
//!
//! Transitions happen in [`crate::sender`] and [`crate::receiver`]; the
//! types live here so both sides and their logs share one vocabulary.

/// Sender FSM, one cycle per packet.
///
/// ```text
///  IDLE ──send──▶ AWAITING_ACK ──matching ACK──▶ ACKED
///                   │      ▲
///           timeout │      │ resend
///                   ▼      │
///                   RETRY ─┘ ──retries exhausted──▶ ABORTED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// No packet in flight.
    #[default]
    Idle,
    /// A packet is on the wire; waiting for its acknowledgment.
    AwaitingAck,
    /// The in-flight packet was acknowledged; sequence advanced.
    Acked,
    /// The wait timed out and the packet is being resent.
    Retry,
    /// Retries exhausted; the transfer failed.
    Aborted,
}

/// Receiver FSM.
///
/// ```text
///  RECEIVING ──EOF accepted in order──▶ TERMINATED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    #[default]
    Receiving,
    Terminated,
}

impl std::fmt::Display for SenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

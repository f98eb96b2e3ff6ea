use crate::Slot;
use can_transport::TransportError;
use thiserror::Error;

pub type Result<T, E = NodeError> = core::result::Result<T, E>;

/// Everything that can go wrong talking to node boards. None of these is fatal to the host.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("too many node boards: slot {slot} exceeds capacity {capacity}")]
    CapacityExceeded { slot: usize, capacity: usize },
    #[error("bus identifier 0x{0:X} is not an 11-bit CAN id")]
    InvalidAddress(u16),
    #[error("node board {0} doesn't exist")]
    NotFound(Slot),
    #[error("no switch {0}")]
    InvalidSwitchIndex(u8),
    #[error("servo {0} not found")]
    InvalidServoIndex(u8),
    #[error("channel {channel} out of range (0..{count})")]
    ChannelOutOfRange { channel: usize, count: usize },
    #[error("unknown command 0x{0:02X}")]
    UnknownCommand(u8),
    #[error("frame too short for opcode 0x{opcode:02X}: {len} bytes")]
    ShortFrame { opcode: u8, len: usize },
    #[error("node board {0} dead")]
    BoardUnresponsive(Slot),
    #[error("liveness probe cancelled")]
    Cancelled,
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

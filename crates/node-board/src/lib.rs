//! node-board: host-side protocol core for node boards on a shared CAN bus
//!
//! A node board carries nine analog inputs, five switches and three servo outputs. Up to
//! [`MAX_BOARDS`] identical boards share one bus; each gets a fixed pair of identifiers from
//! the [`AddressTable`] in registration order. Status frames are decoded into a per-board
//! [`BoardState`], servo commands are only sent when the angle changes, and
//! [`NodeController::started`] runs the bounded start handshake that decides whether a
//! board's data can be trusted.

mod error;
pub use error::{NodeError, Result};

pub mod opcode;
pub use opcode::Opcode;

mod address;
pub use address::{AddressPair, AddressTable};

mod state;
pub use state::{BoardSnapshot, BoardState};

pub mod decode;
pub use decode::Decoded;

pub mod encode;
pub use encode::ServoFrame;

mod clock;
pub use clock::{Clock, ManualClock, SystemClock};

pub mod liveness;
pub use liveness::{CancelFlag, Liveness, LivenessConfig, ProbeOutcome};

mod registry;
pub use registry::{Board, Dispatch, ErrorRecord, NodeRegistry, ERROR_LOG_CAPACITY};

mod config;
pub use config::{load_config_file, AddressConfig, AddressLayout, NodeConfig};

mod metrics;
pub use metrics::NodeMetrics;

mod controller;
pub use controller::NodeController;

/// Registration order of a board, `0..MAX_BOARDS`.
pub type Slot = usize;

pub const MAX_BOARDS: usize = 8;
pub const ANALOG_COUNT: usize = 9;
pub const SWITCH_COUNT: usize = 5;
pub const SERVO_COUNT: usize = 3;

/// Servo angle recorded before the first command.
pub const SERVO_UNSET: u16 = 0xFFFF;

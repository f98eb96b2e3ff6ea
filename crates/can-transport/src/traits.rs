use crate::{CanFilter, CanFrame, Result, TransportError};

/// A minimal blocking CAN bus interface.
pub trait CanBus {
    /// Open a CAN interface by name (e.g., "can0", "mock0").
    fn open(name: &str) -> Result<Self>
    where
        Self: Sized;

    /// Replace the acceptance filters, if supported.
    ///
    /// An empty slice accepts every frame.
    fn set_filters(&mut self, _filters: &[CanFilter]) -> Result<()> {
        let _ = _filters;
        Err(TransportError::Unsupported("filters not supported"))
    }

    /// Receive one frame, blocking up to `timeout_ms` (`Some(0)` polls without waiting).
    ///
    /// Returns [`TransportError::Timeout`] when nothing arrived.
    fn recv(&mut self, _timeout_ms: Option<u64>) -> Result<CanFrame>;

    /// Send one frame.
    fn send(&mut self, frame: &CanFrame) -> Result<()>;
}

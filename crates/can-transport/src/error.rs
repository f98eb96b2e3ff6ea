use thiserror::Error;

pub type Result<T, E = TransportError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("operation not supported on this backend: {0}")]
    Unsupported(&'static str),
    /// Backend failure reported by the driver (socket, adapter, filter table).
    #[error("I/O error: {0}")]
    Io(String),
    #[error("timeout")]
    Timeout,
    #[error("invalid frame: {0}")]
    InvalidFrame(&'static str),
}

impl TransportError {
    /// True for the "nothing arrived in time" case, which pollers treat as idle.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

//! can-transport: CAN bus abstractions for the node host
//!
//! This crate provides the frame and identifier types shared by every bus user, the
//! blocking [`CanBus`] trait that hardware backends implement, and (behind the default
//! `mock` feature) an in-process [`MockBus`] that can script board replies for tests.

mod types;
pub use types::{CanFilter, CanFrame, CanId, Timestamp};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::CanBus;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockBus, Responder};

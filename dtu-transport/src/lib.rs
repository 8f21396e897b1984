//! Transport layer module for the DTU bridge
//!
//! This crate provides the byte-oriented duplex channel abstraction used on
//! both sides of the bridge, with implementations for the meter UART and the
//! cloud TCP connection.

pub mod serial;
pub mod stream;
pub mod tcp;

pub use dtu_core::{DtuError, DtuResult};
pub use serial::{SerialSettings, SerialTransport};
pub use stream::{StreamAccessor, TransportLayer};
pub use tcp::{TcpSettings, TcpTransport};

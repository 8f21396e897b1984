//! Session layer for the DTU bridge
//!
//! This crate implements the RFC1662-style framing spoken on the meter UART:
//! the frame check sequence, the frame envelope codec and the incremental
//! reassembly of serial reads into complete frames.

pub mod rfc1662;

pub use dtu_core::{DtuError, DtuResult};
pub use rfc1662::*;

//! RFC1662 session layer module

pub mod fcs;
pub mod frame;
pub mod reassembler;
pub mod statistics;

pub use fcs::{reflect_byte, FcsCalc};
pub use frame::{
    Frame, ADDRESS, CONTROL, END, HEADER, PROTOCOL_MODULE_COMMAND, PROTOCOL_RELAY,
};
pub use reassembler::{ReassemblyMode, StreamReassembler, DEFAULT_MAX_BUFFER};
pub use statistics::LinkStatistics;

//! Core types and utilities for the DTU RFC1662 bridge
//!
//! This crate provides the error type, the COSEM service and data type
//! constants, and the parameter codec (the structured content of a frame's
//! INFO-DATA field) used by the framing and bridge crates.

pub mod cosem;
pub mod error;
pub mod parameter;

pub use cosem::{AckCode, CosemCommand, DataType};
pub use error::{DtuError, DtuResult};
pub use parameter::{Decoded, GetReply, Parameter, PartialReason, RequestData};

//! dtu - RFC1662 protocol bridge for cellular DTU modules
//!
//! A DTU sits between an electricity meter's UART and a cloud TCP endpoint.
//! The meter talks RFC1662-framed COSEM-style commands; the DTU relays meter
//! payloads to the cloud, wraps cloud bytes into relay frames for the meter,
//! and answers module commands addressed to itself.
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `dtu-core`: Error type, COSEM constants and the parameter codec
//! - `dtu-transport`: Transport layer (Serial, TCP)
//! - `dtu-session`: RFC1662 framing (FCS, frame codec, stream reassembly)
//! - `dtu-bridge`: Protocol-id dispatch, bridge configuration and runtime
//!
//! # Usage
//!
//! ```no_run
//! use dtu::bridge::{BridgeConfig, DtuBridge};
//!
//! # async fn start() -> dtu::DtuResult<()> {
//! let config = BridgeConfig::from_json_file("/usr/dtu.json")?;
//! DtuBridge::builder(config)?.build()?.run().await
//! # }
//! ```

// Re-export core types
pub use dtu_core::{
    AckCode, CosemCommand, DataType, Decoded, DtuError, DtuResult, GetReply, Parameter,
    PartialReason, RequestData,
};

// Re-export framing
pub mod session {
    pub use dtu_session::*;
}

// Re-export transports
pub mod transport {
    pub use dtu_transport::*;
}

// Re-export bridge runtime
pub mod bridge {
    pub use dtu_bridge::*;
}

pub use dtu_bridge::{BridgeConfig, DtuBridge, FrameHandler, ProtocolRegistry};
pub use dtu_session::{Frame, ReassemblyMode, StreamReassembler};

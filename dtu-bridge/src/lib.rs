//! Protocol bridge between a meter UART and a cloud TCP endpoint
//!
//! This crate wires the framing layer to the transports: frames reassembled
//! from the meter are dispatched by protocol id through a [`ProtocolRegistry`],
//! relay frames are forwarded to the cloud, and cloud bytes are wrapped back
//! into relay frames for the meter.

pub mod bridge;
pub mod config;
pub mod registry;

pub use bridge::{
    pump_link, run_cloud_link, run_meter_link, DtuBridge, DtuBridgeBuilder, LinkEnd, RelayToCloud,
};
pub use config::{BridgeConfig, CloudConfig, SerialConfig};
pub use dtu_core::{DtuError, DtuResult};
pub use registry::{FrameHandler, ProtocolRegistry};

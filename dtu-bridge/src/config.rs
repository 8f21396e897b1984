//! Bridge configuration
//!
//! Loaded from a JSON document such as:
//!
//! ```json
//! {
//!     "serial": { "port": "/dev/ttyS1", "baud_rate": 115200 },
//!     "cloud": { "host": "iot.example.com", "port": 9000, "reconnect_interval_ms": 5000 },
//!     "reassembly_mode": "compatible"
//! }
//! ```
//!
//! Every field has a default, so a document only needs what differs.

use dtu_core::{DtuError, DtuResult};
use dtu_session::rfc1662::frame::frame_len;
use dtu_session::{ReassemblyMode, DEFAULT_MAX_BUFFER};
use dtu_transport::{SerialSettings, TcpSettings};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Meter UART configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Read timeout in milliseconds; absent means block until data arrives
    pub timeout_ms: Option<u64>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyS0".to_string(),
            baud_rate: 115200,
            timeout_ms: None,
        }
    }
}

impl SerialConfig {
    pub fn to_settings(&self) -> SerialSettings {
        let settings = SerialSettings::new(self.port.clone(), self.baud_rate);
        match self.timeout_ms {
            Some(ms) => settings.with_timeout(Duration::from_millis(ms)),
            None => settings,
        }
    }
}

/// Cloud TCP endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub timeout_ms: Option<u64>,
    /// Delay before re-opening a dropped cloud connection
    pub reconnect_interval_ms: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            connect_timeout_ms: 30_000,
            timeout_ms: None,
            reconnect_interval_ms: 5_000,
        }
    }
}

impl CloudConfig {
    pub fn to_settings(&self) -> TcpSettings {
        let mut settings = TcpSettings::new(self.host.clone(), self.port);
        settings.connect_timeout = Some(Duration::from_millis(self.connect_timeout_ms));
        match self.timeout_ms {
            Some(ms) => settings.with_timeout(Duration::from_millis(ms)),
            None => settings,
        }
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

/// Top level bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub serial: SerialConfig,
    pub cloud: CloudConfig,
    pub reassembly_mode: ReassemblyMode,
    /// Largest single read from either transport
    pub read_chunk_size: usize,
    /// Reassembly buffer cap, in bytes
    pub max_buffer: usize,
    /// Capacity of each outbound queue
    pub channel_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            cloud: CloudConfig::default(),
            reassembly_mode: ReassemblyMode::default(),
            read_chunk_size: 1024,
            max_buffer: DEFAULT_MAX_BUFFER,
            channel_capacity: 64,
        }
    }
}

impl BridgeConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> DtuResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DtuError::Config(format!("invalid bridge config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> DtuResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| DtuError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        log::info!("Loading bridge config from {}", path.display());
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> DtuResult<()> {
        if self.serial.port.is_empty() {
            return Err(DtuError::Config("serial.port is empty".to_string()));
        }
        if self.serial.baud_rate == 0 {
            return Err(DtuError::Config("serial.baud_rate must be positive".to_string()));
        }
        if self.cloud.host.is_empty() {
            return Err(DtuError::Config("cloud.host is empty".to_string()));
        }
        if self.cloud.port == 0 {
            return Err(DtuError::Config("cloud.port must be non-zero".to_string()));
        }
        if self.read_chunk_size == 0 {
            return Err(DtuError::Config("read_chunk_size must be positive".to_string()));
        }
        if self.channel_capacity == 0 {
            return Err(DtuError::Config("channel_capacity must be positive".to_string()));
        }
        let smallest_frame = frame_len(1);
        if self.max_buffer < smallest_frame {
            return Err(DtuError::Config(format!(
                "max_buffer {} cannot hold a {} byte frame",
                self.max_buffer, smallest_frame
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults_are_valid() {
        let config = BridgeConfig::default();
        assert_ok!(config.validate());
        assert_eq!(config.reassembly_mode, ReassemblyMode::Compatible);
        assert_eq!(config.read_chunk_size, 1024);
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config = assert_ok!(BridgeConfig::from_json_str(
            r#"{
                "serial": { "port": "/dev/ttyUSB1", "timeout_ms": 200 },
                "cloud": { "host": "iot.example.com", "reconnect_interval_ms": 1500 },
                "reassembly_mode": "retaining"
            }"#
        ));
        assert_eq!(config.serial.port, "/dev/ttyUSB1");
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.cloud.port, 9000);
        assert_eq!(config.cloud.reconnect_interval(), Duration::from_millis(1500));
        assert_eq!(config.reassembly_mode, ReassemblyMode::Retaining);

        let serial = config.serial.to_settings();
        assert_eq!(serial.port_name, "/dev/ttyUSB1");
        assert_eq!(serial.timeout, Some(Duration::from_millis(200)));

        let tcp = config.cloud.to_settings();
        assert_eq!(tcp.host, "iot.example.com");
        assert_eq!(tcp.connect_timeout, Some(Duration::from_secs(30)));
        assert_eq!(tcp.timeout, None);
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(
            BridgeConfig::from_json_str("{ not json"),
            Err(DtuError::Config(_))
        ));
        assert!(matches!(
            BridgeConfig::from_json_str(r#"{ "reassembly_mode": "greedy" }"#),
            Err(DtuError::Config(_))
        ));
        assert_err!(BridgeConfig::from_json_str(r#"{ "cloud": { "port": 0 } }"#));
        assert_err!(BridgeConfig::from_json_str(r#"{ "max_buffer": 4 }"#));
        assert_err!(BridgeConfig::from_json_str(r#"{ "serial": { "port": "" } }"#));
    }

    #[test]
    fn test_missing_file() {
        let err = assert_err!(BridgeConfig::from_json_file("/nonexistent/dtu.json"));
        assert!(err.to_string().contains("/nonexistent/dtu.json"));
    }
}

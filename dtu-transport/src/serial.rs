//! Serial port transport towards the meter

use crate::stream::{StreamAccessor, TransportLayer};
use async_trait::async_trait;
use dtu_core::{DtuError, DtuResult};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Wrapper for SerialStream that implements Debug
struct DebugSerialStream(SerialStream);

impl fmt::Debug for DebugSerialStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialStream").finish()
    }
}

/// UART settings for the meter link
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: tokio_serial::DataBits,
    pub stop_bits: tokio_serial::StopBits,
    pub parity: tokio_serial::Parity,
    pub flow_control: tokio_serial::FlowControl,
    /// Read/write timeout; None blocks until the meter sends something
    pub timeout: Option<Duration>,
}

impl SerialSettings {
    /// 8N1 without flow control and without a read timeout
    pub fn new(port_name: String, baud_rate: u32) -> Self {
        Self {
            port_name,
            baud_rate,
            data_bits: tokio_serial::DataBits::Eight,
            stop_bits: tokio_serial::StopBits::One,
            parity: tokio_serial::Parity::None,
            flow_control: tokio_serial::FlowControl::None,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Serial port transport layer implementation
#[derive(Debug)]
pub struct SerialTransport {
    stream: Option<DebugSerialStream>,
    settings: SerialSettings,
    closed: bool,
}

impl SerialTransport {
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            stream: None,
            settings,
            closed: true,
        }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    fn stream_mut(&mut self) -> DtuResult<&mut SerialStream> {
        self.stream
            .as_mut()
            .map(|s| &mut s.0)
            .ok_or_else(|| {
                DtuError::Connection(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "Serial stream not connected",
                ))
            })
    }
}

#[async_trait]
impl TransportLayer for SerialTransport {
    async fn open(&mut self) -> DtuResult<()> {
        if !self.closed {
            return Err(DtuError::Connection(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Serial port has already been opened",
            )));
        }

        let stream = tokio_serial::new(&self.settings.port_name, self.settings.baud_rate)
            .data_bits(self.settings.data_bits)
            .stop_bits(self.settings.stop_bits)
            .parity(self.settings.parity)
            .flow_control(self.settings.flow_control)
            .open_native_async()
            .map_err(|e| {
                DtuError::Connection(std::io::Error::other(format!(
                    "Failed to open serial port {}: {}",
                    self.settings.port_name, e
                )))
            })?;

        log::info!(
            "Opened serial port {} at {} baud",
            self.settings.port_name,
            self.settings.baud_rate
        );
        self.stream = Some(DebugSerialStream(stream));
        self.closed = false;
        Ok(())
    }
}

#[async_trait]
impl StreamAccessor for SerialTransport {
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> DtuResult<()> {
        self.settings.timeout = timeout;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> DtuResult<usize> {
        let timeout = self.settings.timeout;
        let stream = self.stream_mut()?;

        let result = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, stream.read(buf))
                .await
                .map_err(|_| DtuError::Timeout)?
                .map_err(DtuError::Connection),
            None => stream.read(buf).await.map_err(DtuError::Connection),
        };

        match result {
            Ok(0) => {
                log::warn!("Serial port {} reached EOF", self.settings.port_name);
                self.closed = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.closed = true;
                Err(e)
            }
        }
    }

    async fn write(&mut self, buf: &[u8]) -> DtuResult<usize> {
        let timeout = self.settings.timeout;
        let stream = self.stream_mut()?;

        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, stream.write(buf))
                .await
                .map_err(|_| DtuError::Timeout)?
                .map_err(DtuError::Connection),
            None => stream.write(buf).await.map_err(DtuError::Connection),
        }
    }

    async fn flush(&mut self) -> DtuResult<()> {
        self.stream_mut()?.flush().await.map_err(DtuError::Connection)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> DtuResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.0.flush().await;
        }
        self.closed = true;
        Ok(())
    }
}

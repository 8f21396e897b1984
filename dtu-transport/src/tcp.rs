//! TCP transport towards the cloud endpoint

use crate::stream::{StreamAccessor, TransportLayer};
use async_trait::async_trait;
use dtu_core::{DtuError, DtuResult};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Wrapper for TcpStream that implements Debug
struct DebugTcpStream(TcpStream);

impl fmt::Debug for DebugTcpStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpStream").finish()
    }
}

/// TCP client settings
#[derive(Debug, Clone)]
pub struct TcpSettings {
    /// Host name or IP address; resolved on every open
    pub host: String,
    pub port: u16,
    /// Bound on connection establishment
    pub connect_timeout: Option<Duration>,
    /// Read/write timeout; None keeps an idle uplink open indefinitely
    pub timeout: Option<Duration>,
}

impl TcpSettings {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Some(Duration::from_secs(30)),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// TCP transport layer implementation
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<DebugTcpStream>,
    settings: TcpSettings,
    closed: bool,
}

impl TcpTransport {
    pub fn new(settings: TcpSettings) -> Self {
        Self {
            stream: None,
            settings,
            closed: true,
        }
    }

    pub fn settings(&self) -> &TcpSettings {
        &self.settings
    }

    fn stream_mut(&mut self) -> DtuResult<&mut TcpStream> {
        self.stream
            .as_mut()
            .map(|s| &mut s.0)
            .ok_or_else(|| {
                DtuError::Connection(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "TCP stream not connected",
                ))
            })
    }
}

impl fmt::Display for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TcpTransport(host=\"{}\",port={})", self.settings.host, self.settings.port)
    }
}

#[async_trait]
impl TransportLayer for TcpTransport {
    async fn open(&mut self) -> DtuResult<()> {
        if !self.closed {
            return Err(DtuError::Connection(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Connection has already been opened",
            )));
        }

        let target = (self.settings.host.as_str(), self.settings.port);
        let stream = match self.settings.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, TcpStream::connect(target))
                .await
                .map_err(|_| DtuError::Timeout)??,
            None => TcpStream::connect(target).await?,
        };
        stream.set_nodelay(true)?;

        log::info!("Connected to {}:{}", self.settings.host, self.settings.port);
        self.stream = Some(DebugTcpStream(stream));
        self.closed = false;
        Ok(())
    }
}

#[async_trait]
impl StreamAccessor for TcpTransport {
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
            let _ = stream.0.shutdown().await;
        }
        self.closed = true;
        Ok(())
    }
}

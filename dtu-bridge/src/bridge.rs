//! Bridge runtime between the meter UART and the cloud socket
//!
//! Each transport is owned by one link pump: a loop that reads chunks from
//! the transport and writes whatever arrives on the link's outbound queue.
//!
//! ```text
//!  meter ──UART──> StreamReassembler ──> ProtocolRegistry ──(0x2100)──> cloud queue
//!  meter <──UART── meter queue <── encode_relay <──TCP── cloud
//! ```
//!
//! The meter link ends the bridge when its transport fails. The cloud link is
//! re-opened after `reconnect_interval` whenever it drops.

use crate::config::BridgeConfig;
use crate::registry::{FrameHandler, ProtocolRegistry};
use async_trait::async_trait;
use dtu_core::{DtuError, DtuResult};
use dtu_session::{Frame, StreamReassembler, PROTOCOL_RELAY};
use dtu_transport::{SerialTransport, StreamAccessor, TcpTransport, TransportLayer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Why a link pump stopped without a transport error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEnd {
    /// The peer closed the transport
    Eof,
    /// Every sender of the outbound queue was dropped
    OutboundClosed,
}

/// Queue `bytes` without waiting; a full or closed queue drops them
fn enqueue(queue: &mpsc::Sender<Vec<u8>>, bytes: Vec<u8>, link: &str) {
    match queue.try_send(bytes) {
        Ok(()) => {}
        Err(TrySendError::Full(bytes)) => {
            log::warn!("{} queue full, dropping {} bytes", link, bytes.len());
        }
        Err(TrySendError::Closed(bytes)) => {
            log::warn!("{} link down, dropping {} bytes", link, bytes.len());
        }
    }
}

/// Forwards the payload of 0x2100 relay frames to the cloud
#[derive(Debug, Clone)]
pub struct RelayToCloud {
    cloud: mpsc::Sender<Vec<u8>>,
}

impl RelayToCloud {
    pub fn new(cloud: mpsc::Sender<Vec<u8>>) -> Self {
        Self { cloud }
    }
}

#[async_trait]
impl FrameHandler for RelayToCloud {
    async fn handle(&self, frame: Frame) {
        match frame.relay_payload() {
            Some(payload) if !payload.is_empty() => {
                log::debug!("Relaying {} bytes to cloud", payload.len());
                enqueue(&self.cloud, payload.to_vec(), "Cloud");
            }
            _ => log::debug!("Relay frame without payload: {:?}", frame.info_data()),
        }
    }
}

/// Drive one transport until EOF, error, or the outbound queue closes
///
/// Each non-empty read is passed to `on_chunk`; an empty read is EOF. Read
/// timeouts are not errors, the pump simply reads again.
pub async fn pump_link<S, F>(
    stream: &mut S,
    chunk_size: usize,
    outbound: &mut mpsc::Receiver<Vec<u8>>,
    mut on_chunk: F,
) -> DtuResult<LinkEnd>
where
    S: StreamAccessor + ?Sized,
    F: FnMut(&[u8]),
{
    loop {
        tokio::select! {
            read = stream.read_chunk(chunk_size) => match read {
                Ok(chunk) if chunk.is_empty() => return Ok(LinkEnd::Eof),
                Ok(chunk) => on_chunk(&chunk),
                Err(DtuError::Timeout) => continue,
                Err(e) => return Err(e),
            },
            bytes = outbound.recv() => match bytes {
                Some(bytes) => {
                    stream.write_all(&bytes).await?;
                    stream.flush().await?;
                }
                None => return Ok(LinkEnd::OutboundClosed),
            },
        }
    }
}

/// Reassemble meter frames and dispatch them through `registry`
pub async fn run_meter_link<S>(
    serial: &mut S,
    config: &BridgeConfig,
    registry: Arc<ProtocolRegistry>,
    outbound: &mut mpsc::Receiver<Vec<u8>>,
) -> DtuResult<LinkEnd>
where
    S: StreamAccessor + ?Sized,
{
    let mut reassembler =
        StreamReassembler::new(config.reassembly_mode).with_max_buffer(config.max_buffer);
    let result = pump_link(serial, config.read_chunk_size, outbound, |chunk| {
        for frame in reassembler.push(chunk) {
            registry.resolve(frame);
        }
    })
    .await;

    let stats = reassembler.statistics();
    log::info!(
        "Meter link stopped: {} frames decoded, {} bytes discarded, {:.1}% decode errors",
        stats.frames_decoded,
        stats.bytes_discarded,
        stats.error_rate()
    );
    result
}

/// Keep the cloud connection up and wrap its bytes into relay frames
///
/// Returns once the outbound queue is closed; connection failures are logged
/// and retried after `reconnect_interval`.
pub async fn run_cloud_link<C>(
    cloud: &mut C,
    chunk_size: usize,
    reconnect_interval: Duration,
    to_meter: mpsc::Sender<Vec<u8>>,
    outbound: &mut mpsc::Receiver<Vec<u8>>,
) -> DtuResult<()>
where
    C: TransportLayer + ?Sized,
{
    loop {
        match cloud.open().await {
            Ok(()) => {
                log::info!("Cloud link up");
                let result = pump_link(cloud, chunk_size, outbound, |chunk| {
                    match Frame::encode_relay(chunk) {
                        Ok(frame) => enqueue(&to_meter, frame, "Meter"),
                        Err(e) => log::warn!("Cannot relay cloud data: {}", e),
                    }
                })
                .await;
                let _ = cloud.close().await;
                match result {
                    Ok(LinkEnd::OutboundClosed) => return Ok(()),
                    Ok(LinkEnd::Eof) => log::warn!("Cloud closed the connection"),
                    Err(e) => log::error!("Cloud link error: {}", e),
                }
            }
            Err(e) => {
                log::error!("Cloud connect failed: {}", e);
                let _ = cloud.close().await;
            }
        }
        tokio::time::sleep(reconnect_interval).await;
    }
}

/// Builder for [`DtuBridge`]
///
/// The 0x2100 relay handler is registered on creation; further handlers may
/// be added before [`build`](Self::build) freezes the registry.
#[derive(Debug)]
pub struct DtuBridgeBuilder {
    config: BridgeConfig,
    registry: ProtocolRegistry,
    meter_tx: mpsc::Sender<Vec<u8>>,
    meter_rx: mpsc::Receiver<Vec<u8>>,
    cloud_tx: mpsc::Sender<Vec<u8>>,
    cloud_rx: mpsc::Receiver<Vec<u8>>,
}

impl DtuBridgeBuilder {
    fn new(config: BridgeConfig) -> DtuResult<Self> {
        let capacity = config.channel_capacity.max(1);
        let (meter_tx, meter_rx) = mpsc::channel(capacity);
        let (cloud_tx, cloud_rx) = mpsc::channel(capacity);
        let mut registry = ProtocolRegistry::new();
        registry.register(PROTOCOL_RELAY, RelayToCloud::new(cloud_tx.clone()))?;
        Ok(Self {
            config,
            registry,
            meter_tx,
            meter_rx,
            cloud_tx,
            cloud_rx,
        })
    }

    /// Bind an extra handler, e.g. for 0x2200 module commands
    pub fn handler<H: FrameHandler>(mut self, protocol_id: u16, handler: H) -> DtuResult<Self> {
        self.registry.register(protocol_id, handler)?;
        Ok(self)
    }

    /// Queue feeding the meter UART, for handlers that answer the meter
    pub fn meter_sender(&self) -> mpsc::Sender<Vec<u8>> {
        self.meter_tx.clone()
    }

    /// Queue feeding the cloud socket
    pub fn cloud_sender(&self) -> mpsc::Sender<Vec<u8>> {
        self.cloud_tx.clone()
    }

    pub fn build(self) -> DtuResult<DtuBridge> {
        self.config.validate()?;
        log::debug!("Bridge handlers: {:?}", self.registry);
        Ok(DtuBridge {
            config: self.config,
            registry: Arc::new(self.registry),
            meter_tx: self.meter_tx,
            meter_rx: self.meter_rx,
            cloud_rx: self.cloud_rx,
        })
    }
}

/// Serial to cloud protocol bridge
#[derive(Debug)]
pub struct DtuBridge {
    config: BridgeConfig,
    registry: Arc<ProtocolRegistry>,
    meter_tx: mpsc::Sender<Vec<u8>>,
    meter_rx: mpsc::Receiver<Vec<u8>>,
    cloud_rx: mpsc::Receiver<Vec<u8>>,
}

impl DtuBridge {
    /// Start a builder with the relay handler bound to 0x2100
    pub fn builder(config: BridgeConfig) -> DtuResult<DtuBridgeBuilder> {
        DtuBridgeBuilder::new(config)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProtocolRegistry> {
        &self.registry
    }

    /// Open the configured UART and cloud socket and run until the UART fails
    pub async fn run(self) -> DtuResult<()> {
        let serial = SerialTransport::new(self.config.serial.to_settings());
        let cloud = TcpTransport::new(self.config.cloud.to_settings());
        self.run_with(serial, cloud).await
    }

    /// Run over caller supplied transports
    pub async fn run_with<S, C>(self, mut serial: S, mut cloud: C) -> DtuResult<()>
    where
        S: TransportLayer,
        C: TransportLayer + 'static,
    {
        let DtuBridge {
            config,
            registry,
            meter_tx,
            mut meter_rx,
            mut cloud_rx,
        } = self;

        serial.open().await?;
        log::info!("Meter link up");

        let chunk_size = config.read_chunk_size;
        let reconnect_interval = config.cloud.reconnect_interval();
        let cloud_task = tokio::spawn(async move {
            run_cloud_link(
                &mut cloud,
                chunk_size,
                reconnect_interval,
                meter_tx,
                &mut cloud_rx,
            )
            .await
        });

        let result = run_meter_link(&mut serial, &config, registry, &mut meter_rx).await;
        cloud_task.abort();
        let _ = serial.close().await;

        match result {
            Ok(end) => {
                log::info!("Meter link ended: {:?}", end);
                Ok(())
            }
            Err(e) => {
                log::error!("Meter link failed: {}", e);
                Err(e)
            }
        }
    }
}

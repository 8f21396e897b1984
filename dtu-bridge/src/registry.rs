//! Protocol-id dispatch
//!
//! Frames coming off the meter link are routed by their PROTOCOL_ID to the
//! handler registered for it. Every dispatched frame runs on its own tokio
//! task, so a slow handler never stalls reassembly and frames carry no
//! ordering guarantee relative to each other.
//!
//! # Usage Example
//! ```rust,no_run
//! use dtu_bridge::registry::ProtocolRegistry;
//! use dtu_session::Frame;
//! use std::sync::Arc;
//!
//! let mut registry = ProtocolRegistry::new();
//! registry.register(0x2200, |frame: Frame| async move {
//!     log::info!("module command {:?}", frame.command());
//! })?;
//!
//! // Frozen for dispatch
//! let registry = Arc::new(registry);
//! # Ok::<(), dtu_core::DtuError>(())
//! ```

use async_trait::async_trait;
use dtu_core::{DtuError, DtuResult};
use dtu_session::Frame;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Handler bound to one protocol id
#[async_trait]
pub trait FrameHandler: Send + Sync + 'static {
    async fn handle(&self, frame: Frame);
}

#[async_trait]
impl<F, Fut> FrameHandler for F
where
    F: Fn(Frame) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, frame: Frame) {
        (self)(frame).await
    }
}

/// Mapping from protocol id to handler
///
/// Mutated through `&mut self` while the bridge is being set up, then shared
/// behind an `Arc` for dispatch, so no registration can race a lookup.
#[derive(Default)]
pub struct ProtocolRegistry {
    handlers: HashMap<u16, Arc<dyn FrameHandler>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `protocol_id`
    ///
    /// # Errors
    /// Returns `DuplicateRegistration` if the id is already bound; the
    /// existing binding is kept.
    pub fn register<H: FrameHandler>(&mut self, protocol_id: u16, handler: H) -> DtuResult<()> {
        self.register_arc(protocol_id, Arc::new(handler))
    }

    /// Bind an already shared handler
    pub fn register_arc(
        &mut self,
        protocol_id: u16,
        handler: Arc<dyn FrameHandler>,
    ) -> DtuResult<()> {
        if self.handlers.contains_key(&protocol_id) {
            return Err(DtuError::DuplicateRegistration(protocol_id));
        }
        log::debug!("Registered handler for protocol 0x{:04X}", protocol_id);
        self.handlers.insert(protocol_id, handler);
        Ok(())
    }

    /// Dispatch `frame` to its handler on a new task
    ///
    /// Frames with no bound handler are logged and dropped; `None` is
    /// returned and nothing is spawned.
    pub fn resolve(&self, frame: Frame) -> Option<JoinHandle<()>> {
        let protocol_id = frame.protocol_id();
        match self.handlers.get(&protocol_id) {
            Some(handler) => {
                let handler = Arc::clone(handler);
                Some(tokio::spawn(async move { handler.handle(frame).await }))
            }
            None => {
                log::warn!("{}", DtuError::UnroutableProtocolId(protocol_id));
                None
            }
        }
    }

    pub fn contains(&self, protocol_id: u16) -> bool {
        self.handlers.contains_key(&protocol_id)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Bound protocol ids in ascending order
    pub fn protocol_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.handlers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self
            .protocol_ids()
            .iter()
            .map(|id| format!("0x{:04X}", id))
            .collect();
        f.debug_struct("ProtocolRegistry")
            .field("protocol_ids", &ids)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtu_session::{PROTOCOL_MODULE_COMMAND, PROTOCOL_RELAY};
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    fn relay_frame(payload: &[u8]) -> Frame {
        Frame::decode(&Frame::encode_relay(payload).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_resolve_runs_registered_handler() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut registry = ProtocolRegistry::new();
        assert_ok!(registry.register(PROTOCOL_RELAY, move |frame: Frame| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(frame.relay_payload().map(<[u8]>::to_vec));
            }
        }));

        let registry = Arc::new(registry);
        let handle = registry.resolve(relay_frame(&[0x01, 0x02])).unwrap();
        handle.await.unwrap();
        assert_eq!(rx.recv().await, Some(Some(vec![0x01, 0x02])));
    }

    #[tokio::test]
    async fn test_duplicate_registration_keeps_first_handler() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let first = tx.clone();
        let mut registry = ProtocolRegistry::new();
        assert_ok!(registry.register(PROTOCOL_RELAY, move |_frame: Frame| {
            let tx = first.clone();
            async move {
                let _ = tx.send("first");
            }
        }));

        let err = assert_err!(registry.register(PROTOCOL_RELAY, move |_frame: Frame| {
            let tx = tx.clone();
            async move {
                let _ = tx.send("second");
            }
        }));
        assert!(matches!(err, DtuError::DuplicateRegistration(0x2100)));
        assert_eq!(registry.handler_count(), 1);

        registry.resolve(relay_frame(&[0xFF])).unwrap().await.unwrap();
        assert_eq!(rx.recv().await, Some("first"));
    }

    #[tokio::test]
    async fn test_unroutable_frame_is_dropped() {
        let registry = ProtocolRegistry::new();
        assert!(registry.resolve(relay_frame(&[0x00])).is_none());
        assert!(!registry.contains(PROTOCOL_RELAY));
    }

    #[test]
    fn test_protocol_ids_sorted() {
        let mut registry = ProtocolRegistry::new();
        registry
            .register(PROTOCOL_MODULE_COMMAND, |_frame: Frame| async {})
            .unwrap();
        registry.register(PROTOCOL_RELAY, |_frame: Frame| async {}).unwrap();
        assert_eq!(registry.protocol_ids(), vec![0x2100, 0x2200]);
        assert_eq!(
            format!("{:?}", registry),
            "ProtocolRegistry { protocol_ids: [\"0x2100\", \"0x2200\"] }"
        );
    }
}

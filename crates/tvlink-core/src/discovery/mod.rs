//! Receiver discovery.
//!
//! Three interchangeable strategies (UDP broadcast probe, mDNS service browse,
//! static list) behind one [`DiscoveryTransport`]. Every `scan` returns a
//! [`ScanSession`] that owns the underlying socket/daemon; stopping or dropping
//! the session releases it.

pub mod broadcast;
pub mod fixed;
pub mod mdns;
pub mod service;

use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{DiscoveryConfig, DiscoveryStrategy};
use crate::error::DiscoveryError;
use crate::types::{DeviceObservation, DiscoverySource};

pub use broadcast::{parse_response, BroadcastTransport};
pub use fixed::StaticTransport;
pub use mdns::MdnsTransport;
pub use service::DiscoveryService;

/// Observations buffered between the scan task and its consumer.
const OBSERVATION_BUFFER: usize = 64;

/// A discovery strategy selected by configuration.
#[derive(Debug, Clone)]
pub enum DiscoveryTransport {
    Broadcast(BroadcastTransport),
    Multicast(MdnsTransport),
    Static(StaticTransport),
}

impl DiscoveryTransport {
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        match config.strategy {
            DiscoveryStrategy::Broadcast => {
                DiscoveryTransport::Broadcast(BroadcastTransport::new(config.broadcast.clone()))
            }
            DiscoveryStrategy::Mdns => {
                DiscoveryTransport::Multicast(MdnsTransport::new(config.mdns.clone()))
            }
            DiscoveryStrategy::Static => {
                DiscoveryTransport::Static(StaticTransport::new(config.static_addresses.clone()))
            }
        }
    }

    pub fn source(&self) -> DiscoverySource {
        match self {
            DiscoveryTransport::Broadcast(_) => DiscoverySource::Broadcast,
            DiscoveryTransport::Multicast(_) => DiscoverySource::MulticastService,
            DiscoveryTransport::Static(_) => DiscoverySource::Static,
        }
    }

    /// Start a scan session.
    ///
    /// Setup failures (bind, probe send, daemon start) are returned here; the
    /// caller may retry.
    pub async fn scan(&self) -> Result<ScanSession, DiscoveryError> {
        match self {
            DiscoveryTransport::Broadcast(t) => t.scan().await,
            DiscoveryTransport::Multicast(t) => t.scan().await,
            DiscoveryTransport::Static(t) => t.scan().await,
        }
    }
}

/// A running scan.
///
/// Observations arrive in receipt order. The session ends on its own for
/// finite strategies (static list) and otherwise runs until stopped.
pub struct ScanSession {
    source: DiscoverySource,
    observations: mpsc::Receiver<DeviceObservation>,
    task: Option<JoinHandle<()>>,
}

impl ScanSession {
    pub(crate) fn spawn<F, Fut>(source: DiscoverySource, producer: F) -> Self
    where
        F: FnOnce(mpsc::Sender<DeviceObservation>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(OBSERVATION_BUFFER);
        let task = tokio::spawn(producer(tx));
        info!(source = source.display_name(), "scan started");

        Self {
            source,
            observations: rx,
            task: Some(task),
        }
    }

    /// Next observation, or `None` once the scan has ended.
    pub async fn next(&mut self) -> Option<DeviceObservation> {
        self.observations.recv().await
    }

    /// Stop scanning and release the socket or daemon behind this session.
    ///
    /// The producer task is cancelled; its socket is dropped once the runtime
    /// gets to it. Use [`ScanSession::close`] to wait for that.
    pub fn stop(mut self) {
        self.abort();
    }

    /// Stop scanning and wait until the producer task, and with it the
    /// socket or daemon, is gone.
    pub async fn close(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.observations.close();
            let _ = task.await;
            info!(source = self.source.display_name(), "scan stopped");
        }
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.observations.close();
            info!(source = self.source.display_name(), "scan stopped");
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.abort();
    }
}

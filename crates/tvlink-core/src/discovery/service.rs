//! Framework-agnostic discovery driver.
//!
//! Pumps a scan session into a [`DeviceRegistry`] as its single writer and
//! prunes on a fixed interval, so stale devices drop out even when nothing
//! is being received.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::info;

use super::{DiscoveryTransport, ScanSession};
use crate::config::RegistryConfig;
use crate::error::DiscoveryError;
use crate::registry::DeviceRegistry;
use crate::types::Device;

pub struct DiscoveryService {
    registry: Arc<DeviceRegistry>,
    max_age: Duration,
    prune_interval: Duration,
}

impl DiscoveryService {
    pub fn new(registry: Arc<DeviceRegistry>, config: &RegistryConfig) -> Self {
        Self {
            registry,
            max_age: config.max_age(),
            prune_interval: config.prune_interval(),
        }
    }

    /// Run until the session ends.
    ///
    /// Cancel by dropping the future; the session (and its socket) is
    /// released when its owner drops it.
    pub async fn run(&self, session: &mut ScanSession) {
        let mut ticker = interval(self.prune_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                observation = session.next() => match observation {
                    Some(observation) => {
                        self.registry.observe(observation);
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    self.registry.prune(self.max_age);
                }
            }
        }

        info!(devices = self.registry.len(), "scan session ended");
    }

    /// Scan for `duration` and return what was seen, most recent first.
    pub async fn discover_once(
        transport: &DiscoveryTransport,
        duration: Duration,
    ) -> Result<Vec<Device>, DiscoveryError> {
        let registry = DeviceRegistry::new();
        let mut session = transport.scan().await?;

        let _ = timeout(duration, async {
            while let Some(observation) = session.next().await {
                registry.observe(observation);
            }
        })
        .await;

        session.close().await;
        Ok(registry.list())
    }
}

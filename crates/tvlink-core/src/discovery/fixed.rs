//! Static address list, used as a fallback or demo mode.

use tokio::sync::mpsc;

use super::ScanSession;
use crate::error::DiscoveryError;
use crate::types::{DeviceObservation, DiscoverySource};

#[derive(Debug, Clone)]
pub struct StaticTransport {
    addresses: Vec<String>,
}

impl StaticTransport {
    /// Blank entries are dropped.
    pub fn new(addresses: Vec<String>) -> Self {
        let addresses = addresses
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        Self { addresses }
    }

    /// Yields every configured address once, then ends.
    pub async fn scan(&self) -> Result<ScanSession, DiscoveryError> {
        let addresses = self.addresses.clone();

        Ok(ScanSession::spawn(
            DiscoverySource::Static,
            move |tx: mpsc::Sender<DeviceObservation>| async move {
                for address in addresses {
                    let observation = DeviceObservation::new(address, DiscoverySource::Static);
                    if tx.send(observation).await.is_err() {
                        break;
                    }
                }
            },
        ))
    }
}

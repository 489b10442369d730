//! mDNS / DNS-SD service discovery.
//!
//! Browses a fixed service type and yields one observation per address listed
//! in each resolved advertisement. A daemon is started per scan and shut down
//! with it.

use std::collections::BTreeSet;
use std::net::IpAddr;

use mdns_sd::{ServiceDaemon, ServiceEvent};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::ScanSession;
use crate::config::MdnsConfig;
use crate::error::DiscoveryError;
use crate::types::{DeviceObservation, DiscoverySource};

/// Turn the address list of one advertisement into observations.
///
/// Duplicates collapse, and the order is stable so identical adverts produce
/// identical observation sequences.
pub fn observations_for<I>(addresses: I) -> Vec<DeviceObservation>
where
    I: IntoIterator<Item = IpAddr>,
{
    addresses
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|ip| DeviceObservation::new(ip.to_string(), DiscoverySource::MulticastService))
        .collect()
}

/// Owns the daemon for the lifetime of a scan.
struct BrowseGuard {
    daemon: ServiceDaemon,
    service_type: String,
}

impl Drop for BrowseGuard {
    fn drop(&mut self) {
        if let Err(e) = self.daemon.stop_browse(&self.service_type) {
            trace!("mDNS stop_browse: {:?}", e);
        }
        if let Err(e) = self.daemon.shutdown() {
            warn!("Failed to shut down mDNS daemon: {:?}", e);
        }
    }
}

#[derive(Debug, Clone)]
pub struct MdnsTransport {
    config: MdnsConfig,
}

impl MdnsTransport {
    pub fn new(config: MdnsConfig) -> Self {
        Self { config }
    }

    pub async fn scan(&self) -> Result<ScanSession, DiscoveryError> {
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::Mdns(e.to_string()))?;
        let guard = BrowseGuard {
            daemon,
            service_type: self.config.service_type.clone(),
        };

        let receiver = guard
            .daemon
            .browse(&guard.service_type)
            .map_err(|e| DiscoveryError::Mdns(e.to_string()))?;
        debug!(service_type = %guard.service_type, "mDNS browse started");

        Ok(ScanSession::spawn(
            DiscoverySource::MulticastService,
            move |tx: mpsc::Sender<DeviceObservation>| async move {
                let _guard = guard;

                while let Ok(event) = receiver.recv_async().await {
                    let info = match event {
                        ServiceEvent::ServiceResolved(info) => info,
                        other => {
                            trace!("mDNS event: {:?}", other);
                            continue;
                        }
                    };

                    debug!(name = %info.fullname, "mDNS service resolved");
                    let addresses = info.addresses.iter().map(|addr| addr.to_ip_addr());
                    for observation in observations_for(addresses) {
                        if tx.send(observation).await.is_err() {
                            return;
                        }
                    }
                }
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_observation_per_address() {
        let addresses: Vec<IpAddr> = vec![
            "192.168.1.9".parse().unwrap(),
            "fe80::1".parse().unwrap(),
            "192.168.1.9".parse().unwrap(),
        ];

        let observations = observations_for(addresses);

        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].address, "192.168.1.9");
        assert_eq!(observations[1].address, "fe80::1");
        assert!(observations
            .iter()
            .all(|o| o.source == DiscoverySource::MulticastService));
    }

    #[test]
    fn test_empty_advertisement() {
        assert!(observations_for(Vec::<IpAddr>::new()).is_empty());
    }
}

//! Runtime configuration.
//!
//! Every field has a default so a partial (or empty) settings file is valid.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// UDP port probes are sent to and responses are received on.
pub const DISCOVERY_PORT: u16 = 12345;

/// Probe payload sent by the broadcast strategy.
pub const DISCOVERY_PROBE: &str = "DISCOVER";

/// Payload a receiver answers a probe with.
pub const DISCOVERY_ACK: &str = "TV_RESPONSE";

/// Service type browsed by the multicast strategy (trailing dot required by mdns-sd).
pub const MDNS_SERVICE_TYPE: &str = "_http._tcp.local.";

/// Fixed control port of a receiver.
pub const CONTROL_PORT: u16 = 3000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CastConfig {
    pub discovery: DiscoveryConfig,
    pub registry: RegistryConfig,
    pub session: SessionConfig,
    pub media: MediaConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscoveryStrategy {
    #[default]
    Broadcast,
    Mdns,
    Static,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiscoveryConfig {
    pub strategy: DiscoveryStrategy,
    pub broadcast: BroadcastConfig,
    pub mdns: MdnsConfig,
    pub static_addresses: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            strategy: DiscoveryStrategy::default(),
            broadcast: BroadcastConfig::default(),
            mdns: MdnsConfig::default(),
            static_addresses: vec!["192.168.1.2".to_string(), "192.168.1.3".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BroadcastConfig {
    /// Local port to listen on. Probes go to `broadcast_address:port` unless
    /// `probe_target` overrides it.
    pub port: u16,
    pub broadcast_address: Ipv4Addr,
    /// Explicit probe destination; when unset the broadcast address is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_target: Option<SocketAddr>,
    /// Local interface address supplied by the caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<IpAddr>,
    pub probe: String,
    pub ack: String,
}

impl BroadcastConfig {
    pub fn target(&self) -> SocketAddr {
        self.probe_target
            .unwrap_or_else(|| SocketAddr::new(IpAddr::V4(self.broadcast_address), self.port))
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            port: DISCOVERY_PORT,
            broadcast_address: Ipv4Addr::BROADCAST,
            probe_target: None,
            bind_address: None,
            probe: DISCOVERY_PROBE.to_string(),
            ack: DISCOVERY_ACK.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MdnsConfig {
    pub service_type: String,
}

impl Default for MdnsConfig {
    fn default() -> Self {
        Self {
            service_type: MDNS_SERVICE_TYPE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryConfig {
    /// Devices not seen within this many seconds are pruned.
    pub max_age_secs: u64,
    pub prune_interval_ms: u64,
}

impl RegistryConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_millis(self.prune_interval_ms.max(1))
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 30,
            prune_interval_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    pub control_port: u16,
    pub connect_timeout_ms: u64,
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            control_port: CONTROL_PORT,
            connect_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MediaConfig {
    pub default_reference: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            default_reference: "http://path/to/video/file.mp4".to_string(),
        }
    }
}

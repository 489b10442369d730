//! Shared data types: devices, observations, session state and media requests.

use std::fmt;
use std::net::Ipv6Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a device was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscoverySource {
    Broadcast,
    MulticastService,
    Static,
}

impl DiscoverySource {
    pub fn display_name(&self) -> &'static str {
        match self {
            DiscoverySource::Broadcast => "Broadcast",
            DiscoverySource::MulticastService => "mDNS",
            DiscoverySource::Static => "Static",
        }
    }
}

/// A single discovery event: one candidate address and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceObservation {
    pub address: String,
    pub source: DiscoverySource,
    pub observed_at: DateTime<Utc>,
}

impl DeviceObservation {
    pub fn new(address: impl Into<String>, source: DiscoverySource) -> Self {
        Self {
            address: address.into(),
            source,
            observed_at: Utc::now(),
        }
    }

    pub fn at(address: impl Into<String>, source: DiscoverySource, observed_at: DateTime<Utc>) -> Self {
        Self {
            address: address.into(),
            source,
            observed_at,
        }
    }
}

/// A receiver known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub address: String,
    pub discovered_via: DiscoverySource,
    pub last_seen_at: DateTime<Utc>,
}

impl From<DeviceObservation> for Device {
    fn from(obs: DeviceObservation) -> Self {
        Self {
            address: obs.address,
            discovered_via: obs.source,
            last_seen_at: obs.observed_at,
        }
    }
}

/// Control session state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Failed(String),
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }

    /// Disconnected and Failed end a connection attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Disconnected | SessionState::Failed(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// A state transition announced by the session manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    /// Generation of the `connect` call that produced this transition.
    pub attempt: u64,
    pub address: String,
    #[serde(flatten)]
    pub state: SessionState,
}

/// Where the control channel of a device lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlEndpoint {
    pub host: String,
    pub port: u16,
}

impl ControlEndpoint {
    pub fn for_device(device: &Device, port: u16) -> Self {
        Self {
            host: device.address.clone(),
            port,
        }
    }

    fn authority(&self) -> String {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// The endpoint as the receiver advertises it, e.g. `http://192.168.1.2:3000`.
    pub fn http_url(&self) -> String {
        format!("http://{}", self.authority())
    }

    /// WebSocket transport URL for the Socket.IO control channel.
    pub fn websocket_url(&self) -> String {
        format!(
            "ws://{}/socket.io/?EIO=4&transport=websocket",
            self.authority()
        )
    }
}

impl fmt::Display for ControlEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.http_url())
    }
}

/// A media reference handed to the receiver for playback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRequest {
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl MediaRequest {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            dispatched_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(address: &str) -> Device {
        DeviceObservation::new(address, DiscoverySource::Static).into()
    }

    #[test]
    fn test_endpoint_urls_ipv4() {
        let endpoint = ControlEndpoint::for_device(&device("192.168.1.2"), 3000);
        assert_eq!(endpoint.http_url(), "http://192.168.1.2:3000");
        assert_eq!(
            endpoint.websocket_url(),
            "ws://192.168.1.2:3000/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_endpoint_urls_ipv6_are_bracketed() {
        let endpoint = ControlEndpoint::for_device(&device("fe80::1"), 3000);
        assert_eq!(endpoint.http_url(), "http://[fe80::1]:3000");
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Connecting.to_string(), "connecting");
        assert_eq!(
            SessionState::Failed("refused".to_string()).to_string(),
            "failed: refused"
        );
    }

    #[test]
    fn test_session_state_serialization() {
        let json = serde_json::to_value(SessionState::Failed("refused".to_string())).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["reason"], "refused");

        let json = serde_json::to_value(SessionState::Connected).unwrap();
        assert_eq!(json["state"], "connected");
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Disconnected.is_terminal());
        assert!(SessionState::Failed(String::new()).is_terminal());
        assert!(!SessionState::Connected.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
    }
}

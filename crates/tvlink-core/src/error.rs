//! Error types for TVLink core.

use std::net::SocketAddr;

use thiserror::Error;

use crate::types::SessionState;

/// Core error type for shared operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}

/// Discovery transport errors.
///
/// None of these are fatal: the registry is left untouched and the caller may
/// simply scan again.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Failed to bind discovery socket on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Discovery socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("Failed to send discovery probe to {target}: {source}")]
    Send {
        target: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("mDNS daemon error: {0}")]
    Mdns(String),
}

/// Control channel failures.
///
/// These never escape `SessionManager::connect`; they are rendered into the
/// reason carried by `SessionState::Failed` / the disconnect notification.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("timeout")]
    Timeout,

    #[error("{0}")]
    WebSocket(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("{0}")]
    Rejected(String),

    #[error("ping timeout")]
    PingTimeout,

    #[error("{0}")]
    Closed(String),
}

/// Control channel packet decoding errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Empty packet")]
    Empty,

    #[error("Unknown packet type '{0}'")]
    UnknownType(char),

    #[error("Unsupported packet type '{0}'")]
    Unsupported(char),

    #[error("Malformed packet: {0}")]
    Malformed(String),

    #[error("Invalid JSON in packet: {0}")]
    Json(#[from] serde_json::Error),
}

/// Media dispatch errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Not connected (session is {state})")]
    NotConnected { state: SessionState },

    #[error("Media reference must not be empty")]
    EmptyReference,

    #[error("Control channel closed before the message could be queued")]
    ChannelClosed,
}

/// Settings storage errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to resolve settings directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

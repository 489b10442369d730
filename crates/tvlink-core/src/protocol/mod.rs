//! Control channel wire protocol.
//!
//! Receivers speak Socket.IO (v5) over an Engine.IO (v4) WebSocket transport.
//! Only the text packets needed for a control session are handled; binary
//! attachments are rejected.

pub mod engine;
pub mod socket;

pub use engine::{EnginePacket, Handshake};
pub use socket::SocketPacket;

/// Event carrying a media reference to the receiver.
pub const MEDIA_EVENT: &str = "media";

/// Default Socket.IO namespace.
pub const DEFAULT_NAMESPACE: &str = "/";

//! Control session to a single receiver.

pub mod channel;
pub mod manager;
pub mod socketio;

pub use channel::{ChannelEvent, ControlChannel, ControlConnector, OutboundEvent};
pub use manager::SessionManager;
pub use socketio::{SocketIoConnector, CLOSE_GRACE};

//! Shared core for discovering TV receivers on the local network and
//! driving a cast control session to one of them.
//!
//! Used by the `tvlink` CLI; any other front end can drive the same
//! [`DeviceRegistry`], [`SessionManager`] and [`MediaDispatcher`].

pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod storage;
pub mod types;

pub use config::{CastConfig, DiscoveryStrategy};
pub use discovery::{DiscoveryService, DiscoveryTransport, ScanSession};
pub use dispatch::MediaDispatcher;
pub use error::{ConnectionError, CoreError, DiscoveryError, DispatchError, SettingsError};
pub use registry::DeviceRegistry;
pub use session::{SessionManager, SocketIoConnector};
pub use storage::SettingsStorage;
pub use types::*;

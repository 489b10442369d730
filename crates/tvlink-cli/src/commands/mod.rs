//! Command implementations.

pub mod cast;
pub mod config;
pub mod connect;
pub mod discover;

use std::net::IpAddr;

use indicatif::{ProgressBar, ProgressStyle};
use tvlink_core::{CastConfig, Device, DeviceObservation, DiscoverySource, SettingsStorage};

use crate::cli::Cli;
use crate::error::CliError;

pub use cast::run_cast;
pub use config::run_config;
pub use connect::run_connect;
pub use discover::run_discover;

/// Settings after applying command-line overrides.
pub struct Context {
    pub config: CastConfig,
    pub storage: SettingsStorage,
    pub json: bool,
}

impl Context {
    pub async fn load(cli: &Cli) -> Result<Self, CliError> {
        let storage = match &cli.config {
            Some(path) => SettingsStorage::new(path.clone()),
            None => SettingsStorage::default_location()?,
        };

        let mut config = storage.load().await?;
        apply_overrides(&mut config, cli);

        Ok(Self {
            config,
            storage,
            json: cli.json,
        })
    }
}

fn apply_overrides(config: &mut CastConfig, cli: &Cli) {
    if let Some(local_ip) = cli.local_ip {
        config.discovery.broadcast.bind_address = Some(local_ip);
    }
    if let Some(timeout) = cli.timeout {
        config.session.connect_timeout_ms = timeout;
    }
}

/// A receiver given by address on the command line.
pub fn target_device(address: &str) -> Result<Device, CliError> {
    let ip: IpAddr = address
        .trim()
        .parse()
        .map_err(|_| CliError::InvalidArgument(format!("'{}' is not an IP address", address)))?;

    Ok(DeviceObservation::new(ip.to_string(), DiscoverySource::Static).into())
}

/// Spinner on stderr; hidden in JSON mode.
pub fn spinner(message: impl Into<String>, json: bool) -> ProgressBar {
    if json {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.into());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

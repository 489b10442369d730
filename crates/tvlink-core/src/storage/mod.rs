//! Persistent settings.

pub mod settings;

pub use settings::SettingsStorage;

/// Get the default configuration directory for tvlink.
///
/// Uses the `directories` crate to find the platform-specific config
/// directory.
pub fn default_config_dir() -> Option<std::path::PathBuf> {
    directories::ProjectDirs::from("", "", "tvlink").map(|dirs| dirs.config_dir().to_path_buf())
}

//! Output formatting for CLI results.

pub mod json;
pub mod table;

use std::path::Path;

pub use json::JsonOutput;
pub use table::TableOutput;

use tvlink_core::{CastConfig, Device, MediaRequest, SessionEvent};

/// Output formatter trait
pub trait OutputFormatter {
    /// Format device list
    fn format_devices(&self, devices: &[Device]) -> String;

    /// Format one session state change
    fn format_session_event(&self, event: &SessionEvent) -> String;

    /// Format a completed dispatch
    fn format_dispatch(&self, address: &str, request: &MediaRequest) -> String;

    /// Format the effective settings and where they live
    fn format_settings(&self, config: &CastConfig, path: &Path) -> String;

    /// Format a generic message
    fn format_message(&self, message: &str) -> String;

    /// Format an error
    fn format_error(&self, error: &str) -> String;
}

/// Get the appropriate formatter based on JSON flag
pub fn get_formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonOutput::new())
    } else {
        Box::new(TableOutput::new())
    }
}

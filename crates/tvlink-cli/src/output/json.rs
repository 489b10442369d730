//! JSON-formatted output for CLI.

use std::path::Path;

use serde::Serialize;
use serde_json::json;
use tvlink_core::{CastConfig, Device, MediaRequest, SessionEvent};

use super::OutputFormatter;

pub struct JsonOutput;

impl JsonOutput {
    pub fn new() -> Self {
        Self
    }

    fn to_json<T: Serialize>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for JsonOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFormatter for JsonOutput {
    fn format_devices(&self, devices: &[Device]) -> String {
        let output = json!({
            "devices": devices,
            "count": devices.len()
        });
        Self::to_json(&output)
    }

    // One line per event so `connect --json` can be piped line by line.
    fn format_session_event(&self, event: &SessionEvent) -> String {
        serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_dispatch(&self, address: &str, request: &MediaRequest) -> String {
        Self::to_json(&json!({
            "address": address,
            "success": true,
            "request": request
        }))
    }

    fn format_settings(&self, config: &CastConfig, path: &Path) -> String {
        Self::to_json(&json!({
            "path": path.display().to_string(),
            "settings": config
        }))
    }

    fn format_message(&self, message: &str) -> String {
        Self::to_json(&json!({ "message": message }))
    }

    fn format_error(&self, error: &str) -> String {
        Self::to_json(&json!({ "error": error }))
    }
}

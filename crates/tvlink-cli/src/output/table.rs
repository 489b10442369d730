//! Table-formatted output for CLI.

use std::path::Path;

use chrono::{Local, Utc};
use colored::*;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use tvlink_core::{CastConfig, Device, DiscoverySource, MediaRequest, SessionEvent, SessionState};

use super::OutputFormatter;

pub struct TableOutput;

impl TableOutput {
    pub fn new() -> Self {
        Self
    }

    fn source_color(source: DiscoverySource) -> Color {
        match source {
            DiscoverySource::Broadcast => Color::Green,
            DiscoverySource::MulticastService => Color::Cyan,
            DiscoverySource::Static => Color::Yellow,
        }
    }

    fn age(device: &Device) -> String {
        let seconds = (Utc::now() - device.last_seen_at).num_seconds().max(0);
        format!("{}s ago", seconds)
    }

    fn state_label(state: &SessionState) -> ColoredString {
        match state {
            SessionState::Idle => "idle".dimmed(),
            SessionState::Connecting => "connecting".yellow(),
            SessionState::Connected => "connected".green().bold(),
            SessionState::Disconnected => "disconnected".dimmed(),
            SessionState::Failed(_) => "failed".red().bold(),
        }
    }
}

impl Default for TableOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFormatter for TableOutput {
    fn format_devices(&self, devices: &[Device]) -> String {
        if devices.is_empty() {
            return "No devices found.".to_string();
        }

        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Address", "Found Via", "Last Seen", "Age"]);

        for device in devices {
            table.add_row(vec![
                Cell::new(&device.address),
                Cell::new(device.discovered_via.display_name())
                    .fg(Self::source_color(device.discovered_via)),
                Cell::new(
                    device
                        .last_seen_at
                        .with_timezone(&Local)
                        .format("%H:%M:%S")
                        .to_string(),
                ),
                Cell::new(Self::age(device)),
            ]);
        }

        format!("{}\n\nFound {} device(s)", table, devices.len())
    }

    fn format_session_event(&self, event: &SessionEvent) -> String {
        let time = Local::now().format("%H:%M:%S");
        let label = Self::state_label(&event.state);

        match &event.state {
            SessionState::Failed(reason) => format!(
                "[{}] {} #{} {} ({})",
                time.to_string().dimmed(),
                event.address,
                event.attempt,
                label,
                reason
            ),
            _ => format!(
                "[{}] {} #{} {}",
                time.to_string().dimmed(),
                event.address,
                event.attempt,
                label
            ),
        }
    }

    fn format_dispatch(&self, address: &str, request: &MediaRequest) -> String {
        format!("{} {} -> {}", "[OK]".green(), request.reference, address)
    }

    fn format_settings(&self, config: &CastConfig, path: &Path) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Settings: {}", path.display()));
        lines.push(String::new());

        let discovery = &config.discovery;
        lines.push("Discovery:".bold().to_string());
        lines.push(format!("  Strategy:        {:?}", discovery.strategy));
        lines.push(format!(
            "  Broadcast:       {} (port {}, probe {:?}, ack {:?})",
            discovery.broadcast.target(),
            discovery.broadcast.port,
            discovery.broadcast.probe,
            discovery.broadcast.ack
        ));
        if let Some(bind) = discovery.broadcast.bind_address {
            lines.push(format!("  Local address:   {}", bind));
        }
        lines.push(format!("  mDNS service:    {}", discovery.mdns.service_type));
        lines.push(format!(
            "  Static list:     {}",
            discovery.static_addresses.join(", ")
        ));

        lines.push("Registry:".bold().to_string());
        lines.push(format!("  Max age:         {}s", config.registry.max_age_secs));
        lines.push(format!(
            "  Prune interval:  {}ms",
            config.registry.prune_interval_ms
        ));

        lines.push("Session:".bold().to_string());
        lines.push(format!("  Control port:    {}", config.session.control_port));
        lines.push(format!(
            "  Connect timeout: {}ms",
            config.session.connect_timeout_ms
        ));

        lines.push("Media:".bold().to_string());
        lines.push(format!("  Default:         {}", config.media.default_reference));

        lines.join("\n")
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }

    fn format_error(&self, error: &str) -> String {
        format!("{} {}", "Error:".red().bold(), error)
    }
}

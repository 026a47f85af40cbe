use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use wwanmux_core::{DeviceStats, SessionSnapshot};

pub const SCHEMA_BASE: &str = "https://schemas.3leaps.dev/wwanmux/cli/v1";

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn schema_id(name: &str) -> String {
    format!("{SCHEMA_BASE}/{name}.schema.json")
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

pub fn sessions_table(sessions: &[SessionSnapshot]) -> Table {
    let mut table = new_table(vec![
        "TAG", "CLASS", "CHANNEL", "STATE", "TX PKTS", "TX BYTES", "RX PKTS", "RX BYTES",
    ]);
    for session in sessions {
        table.add_row(vec![
            session.tag.to_string(),
            format!("{:?}", session.class).to_uppercase(),
            session.channel.to_string(),
            format!("{:?}", session.state),
            session.stats.tx_packets.to_string(),
            session.stats.tx_bytes.to_string(),
            session.stats.rx_packets.to_string(),
            session.stats.rx_bytes.to_string(),
        ]);
    }
    table
}

pub fn print_device_pretty(device: &DeviceStats) {
    println!("Device:");
    println!("  Name:      {}", device.name);
    println!("  MAC:       {}", device.mac_address);
    println!("  MTU:       {}", device.mtu);
    println!("  Up:        {}", device.up);
    println!("  Sessions:  {}/{}", device.sessions, device.capacity);
    println!(
        "  TX:        {} packets, {} bytes",
        device.totals.tx_packets, device.totals.tx_bytes
    );
    println!(
        "  RX:        {} packets, {} bytes",
        device.totals.rx_packets, device.totals.rx_bytes
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_ids_are_versioned() {
        assert_eq!(
            schema_id("queue-map"),
            "https://schemas.3leaps.dev/wwanmux/cli/v1/queue-map.schema.json"
        );
    }
}

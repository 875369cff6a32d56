//! CLI subcommands — adapter detection, port status, rumble testing.

mod config_cmd;
mod probe;
mod rumble;
mod status;
mod watch;

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Subcommand;
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use gcadapter_lib::config::{ConfigStore, PortsConfig, SiDeviceKind};
pub(super) use gcadapter_lib::error::Result;
pub(super) use gcadapter_lib::protocol::{ControllerType, PORT_COUNT};
pub(super) use gcadapter_lib::usb::UsbTransport;
pub(super) use gcadapter_lib::{Adapter, AdapterOptions, AdapterStatus};

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output: at least
/// PADDING spaces after the longest key, with indented keys aligned to
/// the same value column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{key:<width$}{value}", width = w);
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

/// Human-readable controller type for port listings.
pub(super) fn kind_name(kind: ControllerType) -> &'static str {
    match kind {
        ControllerType::None => "empty",
        ControllerType::Wired => "wired controller",
        ControllerType::Wireless => "wireless controller",
    }
}

// ── Driver setup shared by status/watch/rumble ──

/// Build a driver instance with every port adapter-configured, so the
/// diagnostics commands see all four ports regardless of the saved
/// config.
pub(super) fn open_all_ports() -> Result<Adapter> {
    let transport = Arc::new(UsbTransport::new()?);
    let ports = PortsConfig {
        si_devices: [SiDeviceKind::WiiUAdapter; PORT_COUNT],
        ..Default::default()
    };
    let store = Arc::new(ConfigStore::new(ports));
    let adapter = Adapter::new(transport, store, AdapterOptions::default());
    adapter.init();
    Ok(adapter)
}

/// Poll until the adapter is detected, an error status appears, or
/// `timeout` elapses. Returns the final `is_detected` answer.
pub(super) fn wait_for_detection(adapter: &Adapter, timeout: Duration) -> (bool, Option<String>) {
    let deadline = Instant::now() + timeout;
    loop {
        let result = adapter.is_detected();
        if result.0 || result.1.is_some() || Instant::now() >= deadline {
            return result;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Poll `input` on every port for a short window so the driver's
/// controller-type tracking reflects the live payload stream.
pub(super) fn settle_ports(adapter: &Adapter, window: Duration) {
    let deadline = Instant::now() + window;
    while Instant::now() < deadline {
        for port in 0..PORT_COUNT {
            adapter.input(port);
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct ProbeOutput {
    pub found: bool,
    pub bus: Option<u8>,
    pub address: Option<u8>,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub(super) struct StatusOutput {
    pub detected: bool,
    pub error: Option<String>,
    pub ports: Vec<PortStatusJson>,
}

#[derive(Serialize)]
pub(super) struct PortStatusJson {
    pub port: usize,
    pub kind: String,
    pub connected: bool,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: String,
    pub config_file_exists: bool,
    pub settings: PortsConfig,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check whether a GC adapter is present and claimable
    Probe,

    /// Show adapter detection state and per-port controllers
    Status,

    /// Stream connect/disconnect events until Ctrl+C
    Watch,

    /// Pulse the rumble motor on one port
    Rumble {
        /// Adapter port (1-4)
        #[arg(value_parser = clap::value_parser!(u8).range(1..=4))]
        port: u8,
        /// Pulse duration in milliseconds
        #[arg(long, default_value_t = 500)]
        duration: u64,
    },

    /// Show the saved per-port configuration
    Config,
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, json: bool) -> Result<()> {
    match cmd {
        Command::Probe => probe::cmd_probe(json),
        Command::Status => status::cmd_status(json),
        Command::Watch => {
            if json {
                warn_json_unsupported("watch");
            }
            watch::cmd_watch()
        }
        Command::Rumble { port, duration } => {
            if json {
                warn_json_unsupported("rumble");
            }
            rumble::cmd_rumble(usize::from(port) - 1, Duration::from_millis(duration))
        }
        Command::Config => config_cmd::cmd_config(json),
    }
}


#[cfg(test)]
mod json_struct_tests {
    use super::*;

    #[test]
    fn probe_output_not_found() {
        let output = ProbeOutput {
            found: false,
            bus: None,
            address: None,
            error: None,
        };
        let parsed = serde_json::to_value(&output).unwrap();
        assert_eq!(parsed["found"], false);
        assert!(parsed["bus"].is_null());
        assert!(parsed["error"].is_null());
    }

    #[test]
    fn probe_output_found_with_location() {
        let output = ProbeOutput {
            found: true,
            bus: Some(1),
            address: Some(4),
            error: None,
        };
        let parsed = serde_json::to_value(&output).unwrap();
        assert_eq!(parsed["found"], true);
        assert_eq!(parsed["bus"], 1);
        assert_eq!(parsed["address"], 4);
    }

    #[test]
    fn status_output_serializes_ports() {
        let output = StatusOutput {
            detected: true,
            error: None,
            ports: vec![
                PortStatusJson {
                    port: 1,
                    kind: "wired controller".into(),
                    connected: true,
                },
                PortStatusJson {
                    port: 2,
                    kind: "empty".into(),
                    connected: false,
                },
            ],
        };
        let parsed = serde_json::to_value(&output).unwrap();
        assert_eq!(parsed["detected"], true);
        let ports = parsed["ports"].as_array().unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0]["kind"], "wired controller");
        assert_eq!(ports[1]["connected"], false);
    }

    #[test]
    fn config_output_includes_settings() {
        let output = ConfigOutput {
            config_file: "/home/user/.config/gcadapter/config.toml".into(),
            config_file_exists: false,
            settings: PortsConfig::default(),
        };
        let parsed = serde_json::to_value(&output).unwrap();
        assert_eq!(parsed["config_file_exists"], false);
        assert!(parsed["settings"]["si_devices"].is_array());
        assert_eq!(parsed["settings"]["rumble_enabled"][0], true);
    }
}

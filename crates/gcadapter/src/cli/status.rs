//! `status` subcommand — adapter detection state and per-port controllers.

use std::time::Duration;

use super::{
    kind_name, kv, kv_indent, kv_width, open_all_ports, settle_ports, wait_for_detection,
    PortStatusJson, Result, StatusOutput, PORT_COUNT,
};

pub(super) fn cmd_status(json: bool) -> Result<()> {
    let adapter = open_all_ports()?;
    let (detected, error) = wait_for_detection(&adapter, Duration::from_secs(2));
    if detected {
        // Let a few frames through so type tracking is current.
        settle_ports(&adapter, Duration::from_millis(200));
    }

    let ports: Vec<PortStatusJson> = (0..PORT_COUNT)
        .map(|port| {
            let kind = adapter.controller_type(port);
            PortStatusJson {
                port: port + 1,
                kind: kind_name(kind).into(),
                connected: kind.is_connected(),
            }
        })
        .collect();

    if json {
        let output = StatusOutput {
            detected,
            error,
            ports,
        };
        println!("{}", serde_json::to_string_pretty(&output).unwrap());
        return Ok(());
    }

    let w = kv_width(
        &["Adapter:"],
        &["Port 1:", "Port 2:", "Port 3:", "Port 4:"],
    );
    match (&detected, &error) {
        (true, _) => kv("Adapter:", "detected", w),
        (false, Some(e)) => kv("Adapter:", format!("unavailable ({e})"), w),
        (false, None) => kv("Adapter:", "not detected", w),
    }
    if detected {
        for entry in &ports {
            kv_indent(&format!("Port {}:", entry.port), &entry.kind, w);
        }
    }

    Ok(())
}
